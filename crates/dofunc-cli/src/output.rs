use colored::Colorize;
use dofunc_provider::{Action, ApplyReport, Failure, PlannedChange, RefreshReport, StateFile};
use serde_json::{Value, json};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => print_error(&format!("failed to render JSON: {e}")),
    }
}

fn colored_action(action: Action) -> String {
    match action {
        Action::Create => "create".green().to_string(),
        Action::Update => "update".yellow().to_string(),
        Action::Replace => "replace".magenta().to_string(),
        Action::Delete => "delete".red().to_string(),
        Action::NoOp => "no-op".dimmed().to_string(),
    }
}

pub fn print_plan(changes: &[PlannedChange], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let rows: Vec<Value> = changes
                .iter()
                .map(|c| json!({"resource": c.resource(), "action": c.action.as_str()}))
                .collect();
            print_json(&Value::Array(rows));
        }
        OutputFormat::Table => {
            if changes.is_empty() {
                println!("No resources declared or tracked.");
                return;
            }
            let mut builder = Builder::default();
            builder.push_record(["Resource", "Action"]);
            for change in changes {
                builder.push_record([change.resource(), colored_action(change.action)]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            let pending = changes.iter().filter(|c| c.action.is_change()).count();
            println!("{pending} change(s) pending.");
        }
    }
}

fn failures_json(failures: &[Failure]) -> Vec<Value> {
    failures
        .iter()
        .map(|f| {
            json!({
                "resource": f.resource,
                "action": f.action.as_str(),
                "kind": f.error.kind().to_string(),
                "error": f.error.to_string(),
            })
        })
        .collect()
}

fn print_failures(failures: &[Failure]) {
    for failure in failures {
        print_error(&format!(
            "{} ({}): {}",
            failure.resource.cyan(),
            failure.action,
            failure.error
        ));
    }
}

pub fn print_apply_report(report: &ApplyReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "created": report.created,
            "updated": report.updated,
            "replaced": report.replaced,
            "deleted": report.deleted,
            "unchanged": report.unchanged,
            "failures": failures_json(&report.failures),
        })),
        OutputFormat::Table => {
            let groups = [
                ("Created", &report.created),
                ("Updated", &report.updated),
                ("Replaced", &report.replaced),
                ("Deleted", &report.deleted),
            ];
            for (label, resources) in groups {
                for resource in resources {
                    print_success(&format!("{label} {}", resource.cyan()));
                }
            }
            print_failures(&report.failures);
            println!(
                "{} changed, {} unchanged, {} failed.",
                report.created.len() + report.updated.len() + report.replaced.len() + report.deleted.len(),
                report.unchanged.len(),
                report.failures.len()
            );
        }
    }
}

pub fn print_refresh_report(report: &RefreshReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "present": report.present,
            "drifted": report.drifted,
            "unverified": report.unverified,
            "failures": failures_json(&report.failures),
        })),
        OutputFormat::Table => {
            for resource in &report.present {
                print_success(&format!("{} exists", resource.cyan()));
            }
            for resource in &report.unverified {
                println!("{} {} trusted from local state", "?".yellow(), resource.cyan());
            }
            for resource in &report.drifted {
                println!("{} {} no longer exists", "!".red(), resource.cyan());
            }
            print_failures(&report.failures);
        }
    }
}

pub fn print_state(state: &StateFile, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_value(state) {
            Ok(value) => print_json(&value),
            Err(e) => print_error(&format!("failed to render state: {e}")),
        },
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["Resource", "Id", "Details"]);
            for (address, record) in &state.namespaces {
                builder.push_record([
                    format!("namespace.{address}"),
                    record.id().unwrap_or("-").to_string(),
                    format!("region={}", record.attrs.region),
                ]);
            }
            for (address, record) in &state.functions {
                builder.push_record([
                    format!("function.{address}"),
                    record.id().unwrap_or("-").to_string(),
                    format!(
                        "runtime={} url={}",
                        record.attrs.runtime,
                        record.computed.url.as_deref().unwrap_or("-")
                    ),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
}
