//! Shader capture and injection.
//!
//! Types:
//! - `ShaderCapture` bundles the optional dump store, the optional injector
//!   and the module blob cache, built once from `GutsConfig`.
//! - `ShaderStore` writes the content-addressed dump tree.
//! - `Injector` substitutes a replacement for the configured digest.
//!
//! Every entry point is best effort: errors are logged and the caller carries
//! on with the original bytecode.
mod cache;
mod digest;
mod inject;
mod stage;
mod store;
pub mod transcode;

use std::path::PathBuf;

use gutsconfig::GutsConfig;
use tracing::{info, warn};

pub use cache::ModuleCache;
pub use digest::{ShaderDigest, DIGEST_LEN};
pub use inject::{Injector, Replacement};
pub use stage::{ShaderStage, SPIRV_EXTENSION};
pub use store::{DumpOutcome, ShaderStore};
pub use transcode::TranscodeError;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

#[derive(Debug, Default)]
pub struct ShaderCapture {
    store: Option<ShaderStore>,
    injector: Option<Injector>,
    modules: ModuleCache,
}

impl ShaderCapture {
    pub fn new(store: Option<ShaderStore>, injector: Option<Injector>) -> Self {
        Self {
            store,
            injector,
            modules: ModuleCache::new(),
        }
    }

    /// Features whose settings cannot be used are disabled with a warning.
    pub fn from_config(config: &GutsConfig) -> Self {
        let store = config.dump.path.as_ref().and_then(|root| {
            match ShaderStore::open(root, config.dump.language) {
                Ok(store) => {
                    info!(root = %root.display(), language = %config.dump.language, "shader dump enabled");
                    Some(store)
                }
                Err(err) => {
                    warn!("shader dump disabled: {err}");
                    None
                }
            }
        });

        let injector = match (&config.load.path, &config.load.hash) {
            (Some(path), Some(hash)) => match hash.parse::<ShaderDigest>() {
                Ok(_) if !path.is_file() => {
                    warn!(path = %path.display(), "shader load disabled: replacement file not found");
                    None
                }
                Ok(target) => {
                    info!(
                        target_digest = %target,
                        path = %path.display(),
                        language = %config.load.language,
                        compiler = %config.load.compiler,
                        "shader load enabled"
                    );
                    Some(Injector::new(
                        target,
                        path,
                        config.load.language,
                        config.load.compiler,
                    ))
                }
                Err(err) => {
                    warn!("shader load disabled: {err}");
                    None
                }
            },
            (Some(_), None) | (None, Some(_)) => {
                warn!("shader load disabled: both a load path and a load hash are required");
                None
            }
            (None, None) => None,
        };

        Self::new(store, injector)
    }

    pub fn dump_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn load_enabled(&self) -> bool {
        self.injector.is_some()
    }

    pub fn store(&self) -> Option<&ShaderStore> {
        self.store.as_ref()
    }

    pub fn injector(&self) -> Option<&Injector> {
        self.injector.as_ref()
    }

    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    /// Writes `code` to the dump tree when dumping is enabled.
    pub fn dump(&self, code: &[u8], stage: ShaderStage) -> Option<DumpOutcome> {
        let store = self.store.as_ref()?;
        match store.dump(code, stage) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!(%stage, "shader dump failed: {err}");
                None
            }
        }
    }

    /// Dumps the cached bytecode of a previously created module.
    pub fn dump_module(&self, module: u64, stage: ShaderStage) -> Option<DumpOutcome> {
        if !self.dump_enabled() {
            return None;
        }
        let code = self.modules.get(module)?;
        self.dump(&code, stage)
    }

    /// Keeps a copy of a created module's bytecode for later pipeline dumps.
    pub fn remember_module(&self, module: u64, code: &[u8]) {
        if self.dump_enabled() {
            self.modules.insert(module, code);
        }
    }

    pub fn load(&self, code: &[u8]) -> Option<Replacement> {
        self.injector.as_ref()?.load(code)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use gutsconfig::ShaderLanguage;

    use super::*;

    #[test]
    fn default_config_observes_nothing() {
        let capture = ShaderCapture::from_config(&GutsConfig::default());
        assert!(!capture.dump_enabled());
        assert!(!capture.load_enabled());
        assert_eq!(capture.dump(&[0; 4], ShaderStage::Fragment), None);
        assert_eq!(capture.load(&[0; 4]), None);
    }

    #[test]
    fn load_without_file_is_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GutsConfig::default();
        config.load.path = Some(dir.path().join("missing.spv"));
        config.load.hash = Some(ShaderDigest::of(b"x").to_hex());
        assert!(!ShaderCapture::from_config(&config).load_enabled());

        config.load.hash = None;
        assert!(!ShaderCapture::from_config(&config).load_enabled());
    }

    #[test]
    fn modules_are_cached_only_while_dumping() {
        let capture = ShaderCapture::default();
        capture.remember_module(5, &[1, 2, 3, 4]);
        assert!(capture.modules().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let store = ShaderStore::open(dir.path(), ShaderLanguage::Spirv).unwrap();
        let capture = ShaderCapture::new(Some(store), None);
        capture.remember_module(5, &[1, 2, 3, 4]);
        let outcome = capture.dump_module(5, ShaderStage::Vertex).unwrap();
        assert_eq!(fs::read(outcome.path()).unwrap(), [1, 2, 3, 4]);
        assert_eq!(capture.dump_module(6, ShaderStage::Vertex), None);
    }
}
