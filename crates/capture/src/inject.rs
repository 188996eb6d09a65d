use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gutsconfig::{ShaderCompiler, ShaderLanguage};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::digest::ShaderDigest;
use crate::stage::ShaderStage;
use crate::transcode::{compile_glsl, words_from_bytes, TranscodeError};
use crate::CaptureError;

/// Replacement bytecode handed to a pending creation call.
///
/// Clones share the buffer; the pointer stays valid while any clone lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    words: Arc<[u32]>,
}

impl Replacement {
    pub fn new(words: Vec<u32>) -> Self {
        Self {
            words: words.into(),
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Value for `codeSize`.
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    pub fn as_ptr(&self) -> *const u32 {
        self.words.as_ptr()
    }

    pub fn digest(&self) -> ShaderDigest {
        ShaderDigest::of(self.as_bytes())
    }
}

/// Swaps the one shader whose digest matches `target` for the contents of a
/// replacement file.
#[derive(Debug)]
pub struct Injector {
    target: ShaderDigest,
    path: PathBuf,
    language: ShaderLanguage,
    compiler: ShaderCompiler,
    retained: Mutex<Option<Replacement>>,
}

impl Injector {
    pub fn new(
        target: ShaderDigest,
        path: impl Into<PathBuf>,
        language: ShaderLanguage,
        compiler: ShaderCompiler,
    ) -> Self {
        Self {
            target,
            path: path.into(),
            language,
            compiler,
            retained: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &ShaderDigest {
        &self.target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn matches(&self, code: &[u8]) -> bool {
        ShaderDigest::of(code) == self.target
    }

    /// Returns the replacement when `code` is the target shader. Failures are
    /// logged and yield `None` so the original code is forwarded.
    pub fn load(&self, code: &[u8]) -> Option<Replacement> {
        if !self.matches(code) {
            return None;
        }
        match self.read_replacement() {
            Ok(replacement) => {
                info!(
                    target_digest = %self.target,
                    replacement = %replacement.digest(),
                    path = %self.path.display(),
                    "injecting replacement shader"
                );
                *self.retained.lock() = Some(replacement.clone());
                Some(replacement)
            }
            Err(err) => {
                warn!(
                    target_digest = %self.target,
                    path = %self.path.display(),
                    "shader injection skipped: {err}"
                );
                None
            }
        }
    }

    #[cfg(test)]
    fn retained(&self) -> Option<Replacement> {
        self.retained.lock().clone()
    }

    pub fn read_replacement(&self) -> Result<Replacement, CaptureError> {
        let words = match self.language {
            ShaderLanguage::Spirv => {
                let bytes = fs::read(&self.path).map_err(|source| CaptureError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                words_from_bytes(&bytes)?
            }
            ShaderLanguage::Glsl => {
                let stage = ShaderStage::from_path(&self.path).ok_or_else(|| {
                    TranscodeError::UnknownExtension(self.path.display().to_string())
                })?;
                let source = fs::read_to_string(&self.path).map_err(|source| CaptureError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                compile_glsl(
                    &source,
                    stage,
                    self.compiler,
                    &self.path.display().to_string(),
                )?
            }
        };
        Ok(Replacement::new(words))
    }
}
