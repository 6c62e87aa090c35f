//! Deciding which lifecycle operation brings a resource to its declared state.

use std::collections::BTreeMap;
use std::fmt;

use dofunc_core::{Change, Resource, ResourceRecord};

use super::manifest::Manifest;
use super::state::StateFile;

/// The operation planned for one resource address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    /// Delete followed by create.
    Replace,
    Delete,
    NoOp,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::NoOp => "no-op",
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Action::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan a single resource.
///
/// `prior` is the tracked record (possibly absent), `desired` the declared
/// attributes, `None` when the resource was removed from the manifest.
pub fn plan<R: Resource>(prior: Option<&ResourceRecord<R>>, desired: Option<&R>) -> Action {
    let prior = prior.filter(|r| r.is_present());
    match (prior, desired) {
        (None, None) => Action::NoOp,
        (None, Some(_)) => Action::Create,
        (Some(_), None) => Action::Delete,
        (Some(record), Some(desired)) => match record.attrs.diff(desired) {
            Change::NoOp => Action::NoOp,
            Change::Update => Action::Update,
            Change::Replace => Action::Replace,
        },
    }
}

/// Plan every address of one kind.
///
/// Deletions come first so an identifier moved to another address is
/// released before it is claimed again; the rest follow in address order.
pub fn plan_kind<R: Resource>(
    desired: &BTreeMap<String, R>,
    records: &BTreeMap<String, ResourceRecord<R>>,
) -> Vec<(String, Action)> {
    let mut addresses: Vec<&String> = desired.keys().chain(records.keys()).collect();
    addresses.sort();
    addresses.dedup();
    let mut planned: Vec<(String, Action)> = addresses
        .into_iter()
        .map(|address| {
            let action = plan(records.get(address), desired.get(address));
            (address.clone(), action)
        })
        .filter(|(address, action)| action.is_change() || desired.contains_key(address))
        .collect();
    planned.sort_by_key(|(_, action)| *action != Action::Delete);
    planned
}

/// One line of a rendered plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub kind: &'static str,
    pub address: String,
    pub action: Action,
}

impl PlannedChange {
    /// `<kind>.<address>`, the name used in reports and logs.
    pub fn resource(&self) -> String {
        format!("{}.{}", self.kind, self.address)
    }
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.kind, self.address, self.action)
    }
}

/// Plan the whole manifest against the state: namespaces first, then functions.
pub fn plan_changes(manifest: &Manifest, state: &StateFile) -> Vec<PlannedChange> {
    fn collect<R: Resource>(
        out: &mut Vec<PlannedChange>,
        desired: &BTreeMap<String, R>,
        records: &BTreeMap<String, ResourceRecord<R>>,
    ) {
        out.extend(plan_kind(desired, records).into_iter().map(|(address, action)| PlannedChange {
            kind: R::KIND,
            address,
            action,
        }));
    }

    let mut changes = Vec::new();
    collect(&mut changes, &manifest.namespaces, &state.namespaces);
    collect(&mut changes, &manifest.functions, &state.functions);
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use dofunc_core::{FunctionResource, NamespaceResource};

    fn present<R: Resource>(attrs: R) -> ResourceRecord<R> {
        let mut record = ResourceRecord::absent(attrs.clone());
        record.set_id(attrs.identifier().to_string());
        record
    }

    #[test]
    fn test_plan_single_resource() {
        let f = FunctionResource::new("fn1").with_source_url("https://x/a.zip");
        let rec = present(f.clone());
        let absent = ResourceRecord::absent(f.clone());

        assert_eq!(plan::<FunctionResource>(None, None), Action::NoOp);
        assert_eq!(plan(None, Some(&f)), Action::Create);
        assert_eq!(plan(Some(&absent), Some(&f)), Action::Create);
        assert_eq!(plan(Some(&rec), None), Action::Delete);
        assert_eq!(plan(Some(&absent), None), Action::NoOp);
        assert_eq!(plan(Some(&rec), Some(&f)), Action::NoOp);
        assert_eq!(plan(Some(&rec), Some(&f.clone().with_runtime("go:1.21"))), Action::Update);
        assert_eq!(
            plan(Some(&rec), Some(&f.clone().with_source_url("https://x/b.zip"))),
            Action::Replace
        );
    }

    #[test]
    fn test_namespace_label_change_is_an_update() {
        let rec = present(NamespaceResource::new("main", "ns-a"));
        assert_eq!(plan(Some(&rec), Some(&NamespaceResource::new("main", "ns-b"))), Action::Update);
    }

    #[test]
    fn test_plan_kind_drops_stale_absent_records() {
        let mut desired = BTreeMap::new();
        desired.insert("b".to_string(), NamespaceResource::new("b", "ns-b"));

        let mut records = BTreeMap::new();
        records.insert("a".to_string(), present(NamespaceResource::new("a", "ns-a")));
        records.insert("c".to_string(), ResourceRecord::absent(NamespaceResource::new("c", "ns-c")));

        let planned = plan_kind(&desired, &records);
        assert_eq!(
            planned,
            vec![("a".to_string(), Action::Delete), ("b".to_string(), Action::Create)]
        );
    }

    #[test]
    fn test_plan_kind_runs_deletions_first() {
        let mut desired = BTreeMap::new();
        desired.insert("app".to_string(), NamespaceResource::new("app", "ns-a"));
        desired.insert("web".to_string(), NamespaceResource::new("web", "ns-w"));

        let mut records = BTreeMap::new();
        records.insert("main".to_string(), present(NamespaceResource::new("main", "ns-a")));

        let planned = plan_kind(&desired, &records);
        assert_eq!(
            planned,
            vec![
                ("main".to_string(), Action::Delete),
                ("app".to_string(), Action::Create),
                ("web".to_string(), Action::Create),
            ]
        );
    }

    #[test]
    fn test_plan_changes_orders_namespaces_first() {
        let mut manifest = Manifest::default();
        manifest
            .functions
            .insert("api".into(), FunctionResource::new("fn1").with_source_url("https://x/a.zip"));
        manifest
            .namespaces
            .insert("main".into(), NamespaceResource::new("main", "ns-a"));

        let changes = plan_changes(&manifest, &StateFile::default());
        let rendered: Vec<String> = changes.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["namespace.main: create", "function.api: create"]);
        assert_eq!(changes[1].resource(), "function.api");
    }
}
