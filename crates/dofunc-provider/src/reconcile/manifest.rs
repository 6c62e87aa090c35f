//! Declared resources, read from TOML.
//!
//! ```toml
//! [namespaces.main]
//! name = "main"
//! label = "ns-a"
//!
//! [functions.api]
//! name = "fn1"
//! runtime = "nodejs:18"
//! source_url = "https://example.com/fn1.zip"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use dofunc_core::{FunctionResource, NamespaceResource, ProviderError, Resource, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionResource>,
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespaceResource>,
}

impl Manifest {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ProviderError::invalid_resource(format!("manifest: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::io(format!("reading manifest {}", path.display()), e))?;
        Self::from_toml_str(&raw)
    }

    /// Validate every resource and reject two addresses sharing an identifier.
    pub fn validate(&self) -> Result<()> {
        validate_kind(&self.functions)?;
        validate_kind(&self.namespaces)
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.namespaces.is_empty()
    }
}

fn validate_kind<R: Resource>(resources: &BTreeMap<String, R>) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (address, resource) in resources {
        resource
            .validate()
            .map_err(|e| ProviderError::invalid_resource(format!("{}.{address}: {e}", R::KIND)))?;
        if let Some(other) = seen.insert(resource.identifier(), address) {
            return Err(ProviderError::invalid_resource(format!(
                "{kind}.{other} and {kind}.{address} both manage {kind} '{id}'",
                kind = R::KIND,
                id = resource.identifier()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let m = Manifest::from_toml_str(
            r#"
            [namespaces.main]
            name = "main"
            label = "ns-a"

            [functions.api]
            name = "fn1"
            source_url = "https://example.com/fn1.zip"
            "#,
        )
        .unwrap();
        assert_eq!(m.namespaces["main"].region, "nyc1");
        assert_eq!(m.functions["api"].runtime, "nodejs");
        assert!(m.validate().is_ok());
        assert!(!m.is_empty());
    }

    #[test]
    fn test_computed_url_is_rejected() {
        let err = Manifest::from_toml_str(
            r#"
            [functions.api]
            name = "fn1"
            url = "https://example.com"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResource(_)));
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        let m = Manifest::from_toml_str(
            r#"
            [namespaces.a]
            name = "a"
            label = "shared"

            [namespaces.b]
            name = "b"
            label = "shared"
            "#,
        )
        .unwrap();
        let err = m.validate().unwrap_err().to_string();
        assert!(err.contains("namespace.a and namespace.b"));
    }

    #[test]
    fn test_invalid_resource_names_its_address() {
        let m = Manifest::from_toml_str(
            r#"
            [functions.api]
            name = "a/b"
            "#,
        )
        .unwrap();
        assert!(m.validate().unwrap_err().to_string().contains("function.api"));
    }
}
