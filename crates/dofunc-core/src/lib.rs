pub mod config;
pub mod error;
pub mod resource;

pub use config::{ApiToken, ProviderConfig};
pub use error::{ErrorKind, FunctionStage, ProviderError, Result};
pub use resource::{
    Change, DEFAULT_REGION, DEFAULT_RUNTIME, FunctionComputed, FunctionResource, NamespaceResource,
    Resource, ResourceRecord,
};
