//! Typed resource models.
//!
//! Each managed kind has a *declared* attribute struct (what the user writes
//! in the manifest) and a *computed* struct (what only the remote platform
//! may set). A [`ResourceRecord`] pairs them with the local identifier the
//! orchestrator tracks; `id == None` means the resource is absent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

pub const DEFAULT_RUNTIME: &str = "nodejs";
pub const DEFAULT_REGION: &str = "nyc1";

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// A managed resource kind.
pub trait Resource:
    Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Attributes populated by the remote system, never by the caller.
    type Computed: Clone + Default + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    const KIND: &'static str;

    /// The identifier the resource is tracked under once it exists.
    fn identifier(&self) -> &str;

    fn validate(&self) -> Result<()>;

    /// How moving from `self` (last applied) to `desired` must be carried out.
    fn diff(&self, desired: &Self) -> Change;
}

/// Outcome of diffing last-applied attributes against desired ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    NoOp,
    /// Handled by the kind's update operation.
    Update,
    /// Requires delete followed by create.
    Replace,
}

/// Declared attributes of a serverless function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionResource {
    /// Function name; the remote key and the local identifier. Immutable.
    pub name: String,
    /// Opaque encoded payload forwarded on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Location of the zip or tar.gz archive the create pipeline deploys from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl FunctionResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            runtime: default_runtime(),
            source_url: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// Attributes of a function that only the control plane sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionComputed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Resource for FunctionResource {
    type Computed = FunctionComputed;

    const KIND: &'static str = "function";

    fn identifier(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProviderError::invalid_resource("function name must not be empty"));
        }
        // The name is interpolated into the API path.
        if self.name.contains(['/', '?', '#']) {
            return Err(ProviderError::invalid_resource(format!(
                "function name '{}' must not contain '/', '?' or '#'",
                self.name
            )));
        }
        if self.runtime.trim().is_empty() {
            return Err(ProviderError::invalid_resource("function runtime must not be empty"));
        }
        Ok(())
    }

    fn diff(&self, desired: &Self) -> Change {
        if self == desired {
            Change::NoOp
        } else if self.name != desired.name || self.source_url != desired.source_url {
            // The name is immutable and the source is only consumed on create.
            Change::Replace
        } else {
            Change::Update
        }
    }
}

/// Declared attributes of a serverless namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceResource {
    /// Declared but not used as a remote key.
    pub name: String,
    /// Remote key and local identifier.
    pub label: String,
    #[serde(default = "default_region")]
    pub region: String,
}

impl NamespaceResource {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            region: default_region(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

impl Resource for NamespaceResource {
    type Computed = ();

    const KIND: &'static str = "namespace";

    fn identifier(&self) -> &str {
        &self.label
    }

    fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(ProviderError::invalid_resource("namespace label must not be empty"));
        }
        // Passed positionally to the namespace tool.
        if self.label.starts_with('-') {
            return Err(ProviderError::invalid_resource(format!(
                "namespace label '{}' must not start with '-'",
                self.label
            )));
        }
        if self.region.trim().is_empty() {
            return Err(ProviderError::invalid_resource("namespace region must not be empty"));
        }
        Ok(())
    }

    fn diff(&self, desired: &Self) -> Change {
        // Label renames are destroy-then-recreate inside the update operation.
        if self == desired {
            Change::NoOp
        } else {
            Change::Update
        }
    }
}

/// Local bookkeeping for one resource: identifier plus attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "R: Serialize, R::Computed: Serialize",
    deserialize = "R: DeserializeOwned, R::Computed: DeserializeOwned"
))]
pub struct ResourceRecord<R: Resource> {
    #[serde(default)]
    pub id: Option<String>,
    pub attrs: R,
    #[serde(default)]
    pub computed: R::Computed,
}

impl<R: Resource> ResourceRecord<R> {
    /// A record for a resource that does not exist yet.
    pub fn absent(attrs: R) -> Self {
        Self {
            id: None,
            attrs,
            computed: R::Computed::default(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn clear_id(&mut self) {
        self.id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_defaults_applied() {
        let f: FunctionResource = serde_json::from_str(r#"{"name":"fn1"}"#).unwrap();
        assert_eq!(f.runtime, "nodejs");
        assert!(f.code.is_none());
        assert!(f.source_url.is_none());
    }

    #[test]
    fn test_function_rejects_caller_supplied_url() {
        let err = serde_json::from_str::<FunctionResource>(
            r#"{"name":"fn1","url":"https://example.com"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_namespace_region_default() {
        let ns: NamespaceResource =
            serde_json::from_str(r#"{"name":"main","label":"ns-a"}"#).unwrap();
        assert_eq!(ns.region, "nyc1");
        assert_eq!(ns.identifier(), "ns-a");
    }

    #[test]
    fn test_validation() {
        assert!(FunctionResource::new("fn1").validate().is_ok());
        assert!(FunctionResource::new("").validate().is_err());
        assert!(FunctionResource::new("a/b").validate().is_err());
        assert!(FunctionResource::new("fn1").with_runtime(" ").validate().is_err());

        assert!(NamespaceResource::new("main", "ns-a").validate().is_ok());
        assert!(NamespaceResource::new("main", "").validate().is_err());
        assert!(NamespaceResource::new("main", "--force").validate().is_err());
        assert!(NamespaceResource::new("main", "ns-a").with_region("").validate().is_err());
    }

    #[test]
    fn test_function_diff() {
        let base = FunctionResource::new("fn1").with_source_url("https://x/a.zip");
        assert_eq!(base.diff(&base.clone()), Change::NoOp);
        assert_eq!(base.diff(&base.clone().with_runtime("python:3.11")), Change::Update);
        assert_eq!(base.diff(&base.clone().with_code("Y29kZQ==")), Change::Update);
        assert_eq!(
            base.diff(&FunctionResource::new("fn2").with_source_url("https://x/a.zip")),
            Change::Replace
        );
        assert_eq!(base.diff(&base.clone().with_source_url("https://x/b.zip")), Change::Replace);
    }

    #[test]
    fn test_namespace_diff() {
        let base = NamespaceResource::new("main", "ns-a");
        assert_eq!(base.diff(&base.clone()), Change::NoOp);
        assert_eq!(base.diff(&NamespaceResource::new("main", "ns-b")), Change::Update);
        assert_eq!(base.diff(&base.clone().with_region("ams3")), Change::Update);
    }

    #[test]
    fn test_record_identifier_lifecycle() {
        let mut record = ResourceRecord::absent(NamespaceResource::new("main", "ns-a"));
        assert!(!record.is_present());
        record.set_id("ns-a");
        assert_eq!(record.id(), Some("ns-a"));
        record.clear_id();
        assert!(!record.is_present());
    }

    #[test]
    fn test_record_serde_shape() {
        let mut record = ResourceRecord::absent(FunctionResource::new("fn1"));
        record.set_id("fn1");
        record.computed.url = Some("https://faas.example/fn1".into());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "fn1");
        assert_eq!(json["attrs"]["name"], "fn1");
        assert_eq!(json["computed"]["url"], "https://faas.example/fn1");

        let back: ResourceRecord<FunctionResource> = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
