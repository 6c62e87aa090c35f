pub mod apply;
pub mod plan;
pub mod state;

use std::path::Path;

use anyhow::{Context, Result};
use dofunc_core::Result as ProviderResult;
use dofunc_provider::{Manifest, StateFile};

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let manifest = Manifest::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn load_state(path: &Path) -> Result<StateFile> {
    StateFile::load(path).with_context(|| format!("Failed to load state {}", path.display()))
}

/// Checkpoint that persists the state after every resource operation.
pub fn saver(path: &Path) -> impl FnMut(&StateFile) -> ProviderResult<()> + '_ {
    move |state: &StateFile| state.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saver_writes_loadable_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dofunc.state.json");
        assert_eq!(load_state(&path).unwrap().present_count(), 0);

        let mut save = saver(&path);
        save(&StateFile::default()).unwrap();
        assert!(path.exists());
        assert_eq!(load_state(&path).unwrap().version, dofunc_provider::reconcile::STATE_VERSION);
    }

    #[test]
    fn test_missing_manifest_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load_manifest(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }
}
