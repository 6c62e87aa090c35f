use std::sync::Arc;

use dofunc_core::{ProviderConfig, ProviderError, Result};

use crate::archive::HttpSourceArchive;
use crate::client::ApiClient;
use crate::function::FunctionController;
use crate::namespace::NamespaceController;
use crate::reconcile::Reconciler;
use crate::runner::TokioCommandRunner;

/// Wire the production collaborators from a validated configuration.
pub fn build_reconciler(config: &ProviderConfig) -> Result<Reconciler> {
    config.validate().map_err(ProviderError::configuration)?;

    let runner = Arc::new(TokioCommandRunner::new(config.tools.command_timeout()));
    let api = Arc::new(ApiClient::new(config)?);
    let source = Arc::new(HttpSourceArchive::new(config)?);

    let functions = FunctionController::new(api, source, runner.clone())
        .with_doctl(config.tools.doctl.clone())
        .with_work_root(config.function.work_root.clone())
        .with_unpack_timeout(config.function.fetch_timeout());
    let namespaces = NamespaceController::new(runner)
        .with_doctl(config.tools.doctl.clone())
        .with_verify_on_read(config.namespace.verify_on_read);

    tracing::debug!(
        base_url = %config.api.base_url,
        doctl = %config.tools.doctl,
        verify_namespaces = config.namespace.verify_on_read,
        "provider initialised"
    );
    Ok(Reconciler::new(Arc::new(functions), Arc::new(namespaces)))
}
