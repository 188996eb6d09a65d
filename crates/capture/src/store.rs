use std::fs;
use std::path::{Path, PathBuf};

use gutsconfig::ShaderLanguage;
use tracing::{debug, warn};

use crate::digest::ShaderDigest;
use crate::stage::{ShaderStage, SPIRV_EXTENSION};
use crate::transcode::spirv_to_glsl;
use crate::CaptureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    Written(PathBuf),
    /// An artifact for this stage and digest was already on disk.
    Existing(PathBuf),
}

impl DumpOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DumpOutcome::Written(path) | DumpOutcome::Existing(path) => path,
        }
    }
}

/// Content-addressed dump tree: `<root>/<STAGE>/<digest>.<ext>`.
#[derive(Debug, Clone)]
pub struct ShaderStore {
    root: PathBuf,
    language: ShaderLanguage,
}

impl ShaderStore {
    /// Creates the root directory if needed.
    pub fn open(root: impl Into<PathBuf>, language: ShaderLanguage) -> Result<Self, CaptureError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CaptureError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, language })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn language(&self) -> ShaderLanguage {
        self.language
    }

    pub fn artifact_path(&self, stage: ShaderStage, digest: &ShaderDigest, ext: &str) -> PathBuf {
        self.root
            .join(stage.dir_name())
            .join(format!("{digest}.{ext}"))
    }

    /// Finds an existing artifact for `digest` in either representation.
    pub fn find(&self, stage: ShaderStage, digest: &ShaderDigest) -> Option<PathBuf> {
        [stage.glsl_extension(), SPIRV_EXTENSION]
            .into_iter()
            .map(|ext| self.artifact_path(stage, digest, ext))
            .find(|path| path.is_file())
    }

    pub fn dump(&self, bytes: &[u8], stage: ShaderStage) -> Result<DumpOutcome, CaptureError> {
        let digest = ShaderDigest::of(bytes);
        if let Some(existing) = self.find(stage, &digest) {
            return Ok(DumpOutcome::Existing(existing));
        }

        let stage_dir = self.root.join(stage.dir_name());
        fs::create_dir_all(&stage_dir).map_err(|source| CaptureError::Io {
            path: stage_dir.clone(),
            source,
        })?;

        let (path, contents) = match self.language {
            ShaderLanguage::Spirv => (
                self.artifact_path(stage, &digest, SPIRV_EXTENSION),
                bytes.to_vec(),
            ),
            ShaderLanguage::Glsl => match spirv_to_glsl(bytes) {
                Ok(source) => (
                    self.artifact_path(stage, &digest, stage.glsl_extension()),
                    source.into_bytes(),
                ),
                Err(err) => {
                    warn!(%digest, %stage, "GLSL dump failed, writing SPIR-V instead: {err}");
                    (
                        self.artifact_path(stage, &digest, SPIRV_EXTENSION),
                        bytes.to_vec(),
                    )
                }
            },
        };

        fs::write(&path, contents).map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), %digest, "dumped shader");
        Ok(DumpOutcome::Written(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Vec<u8> {
        [0x0723_0203u32, 0x0001_0000, 0, 4, 0]
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect()
    }

    #[test]
    fn writes_under_stage_directory_keyed_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShaderStore::open(dir.path().join("dumps"), ShaderLanguage::Spirv).unwrap();
        let bytes = blob();

        let outcome = store.dump(&bytes, ShaderStage::Fragment).unwrap();
        let expected = dir
            .path()
            .join("dumps/FS")
            .join(format!("{}.spv", ShaderDigest::of(&bytes)));
        assert_eq!(outcome, DumpOutcome::Written(expected.clone()));
        assert_eq!(fs::read(&expected).unwrap(), bytes);
    }

    #[test]
    fn second_dump_of_same_blob_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShaderStore::open(dir.path(), ShaderLanguage::Spirv).unwrap();
        let bytes = blob();

        let first = store.dump(&bytes, ShaderStage::Vertex).unwrap();
        fs::write(first.path(), b"sentinel").unwrap();
        let second = store.dump(&bytes, ShaderStage::Vertex).unwrap();
        assert_eq!(second, DumpOutcome::Existing(first.path().to_path_buf()));
        assert_eq!(fs::read(first.path()).unwrap(), b"sentinel");

        let other_stage = store.dump(&bytes, ShaderStage::Compute).unwrap();
        assert!(matches!(other_stage, DumpOutcome::Written(_)));
    }

    #[test]
    fn glsl_dump_falls_back_to_spirv_when_decompile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShaderStore::open(dir.path(), ShaderLanguage::Glsl).unwrap();
        let bytes = blob();

        let outcome = store.dump(&bytes, ShaderStage::Geometry).unwrap();
        assert_eq!(
            outcome.path().extension().and_then(|e| e.to_str()),
            Some(SPIRV_EXTENSION)
        );
        assert!(outcome.path().starts_with(dir.path().join("GS")));
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            ShaderStore::open(&file, ShaderLanguage::Spirv),
            Err(CaptureError::Io { .. })
        ));
    }
}
