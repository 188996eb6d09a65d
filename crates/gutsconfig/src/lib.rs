//! Configuration surface for the shader guts layer.
//!
//! Settings come from an optional `guts.toml` file and are then overridden by
//! `VK_SHADER_GUTS_*` environment switches. Resolution never fails: a bad
//! value turns into a [`ConfigIssue`] and the affected feature stays disabled.
mod checkpoint;
mod duration;
pub mod env;
mod paths;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use checkpoint::{CheckpointFunction, CheckpointKind};
pub use duration::parse_interval;
pub use paths::{expand_path, ConfigPaths};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A single rejected setting. The setting is ignored; resolution continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub key: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Representation used for dumped artifacts and replacement sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderLanguage {
    /// Raw SPIR-V bytecode.
    #[default]
    Spirv,
    /// GLSL source text.
    Glsl,
}

impl fmt::Display for ShaderLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderLanguage::Spirv => f.write_str("spirv"),
            ShaderLanguage::Glsl => f.write_str("glsl"),
        }
    }
}

impl FromStr for ShaderLanguage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spirv" | "spv" | "spir-v" => Ok(ShaderLanguage::Spirv),
            "glsl" => Ok(ShaderLanguage::Glsl),
            "" => Err("shader language must not be empty".to_string()),
            other => Err(format!(
                "unknown shader language '{other}'; expected spirv or glsl"
            )),
        }
    }
}

/// GLSL front end used to turn replacement source into SPIR-V.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderCompiler {
    /// glslang through shaderc.
    Shaderc,
    /// naga's GLSL frontend and SPIR-V backend.
    Naga,
}

impl Default for ShaderCompiler {
    fn default() -> Self {
        if cfg!(feature = "shaderc") {
            ShaderCompiler::Shaderc
        } else {
            ShaderCompiler::Naga
        }
    }
}

impl fmt::Display for ShaderCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderCompiler::Shaderc => f.write_str("shaderc"),
            ShaderCompiler::Naga => f.write_str("naga"),
        }
    }
}

impl FromStr for ShaderCompiler {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shaderc" | "glslang" => {
                if cfg!(feature = "shaderc") {
                    Ok(ShaderCompiler::Shaderc)
                } else {
                    Err("shaderc support is not enabled in this build".to_string())
                }
            }
            "naga" | "naga-glsl" => Ok(ShaderCompiler::Naga),
            "" => Err("shader compiler must not be empty".to_string()),
            other => Err(format!(
                "unknown shader compiler '{other}'; expected shaderc or naga"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Root of the content-addressed dump tree; dumping is off when unset.
    pub path: Option<PathBuf>,
    pub language: ShaderLanguage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Replacement file substituted into matching creation calls.
    pub path: Option<PathBuf>,
    /// Lowercase hex digest of the bytecode to replace.
    pub hash: Option<String>,
    pub language: ShaderLanguage,
    pub compiler: ShaderCompiler,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub pause_on_start: bool,
    pub checkpoint_kind: CheckpointKind,
    pub checkpoint: CheckpointFunction,
    #[serde(with = "duration")]
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pause_on_start: false,
            checkpoint_kind: CheckpointKind::Function,
            checkpoint: CheckpointFunction::AcquireNextImage,
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    #[serde(with = "duration")]
    pub interval: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_report_interval(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_report_interval() -> Duration {
    Duration::from_millis(500)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GutsConfig {
    pub dump: DumpConfig,
    pub load: LoadConfig,
    pub playback: PlaybackConfig,
    pub report: ReportConfig,
}

/// Outcome of [`GutsConfig::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    pub config: GutsConfig,
    pub issues: Vec<ConfigIssue>,
    /// Config file that contributed settings, if any.
    pub source: Option<PathBuf>,
}

impl Resolved {
    pub fn log_issues(&self) {
        for issue in &self.issues {
            warn!(key = %issue.key, "ignoring configuration value: {}", issue.message);
        }
    }
}

impl GutsConfig {
    /// Strict parse used for explicit files: any rejected value is an error.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: GutsConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let issues = self.clone().sanitize();
        if issues.is_empty() {
            return Ok(());
        }
        Err(ConfigError::Invalid(
            issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ))
    }

    /// Reads the process environment and the discovered config file.
    pub fn resolve() -> Resolved {
        Self::resolve_with(&ConfigPaths::discover(), |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(paths: &ConfigPaths, lookup: F) -> Resolved
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut issues = Vec::new();
        let mut source = None;

        let mut config = match paths.config_file().filter(|file| file.exists()) {
            Some(file) => match fs::read_to_string(file)
                .map_err(|source| ConfigError::Read {
                    path: file.to_path_buf(),
                    source,
                })
                .and_then(|contents| toml::from_str::<GutsConfig>(&contents).map_err(Into::into))
            {
                Ok(config) => {
                    source = Some(file.to_path_buf());
                    config
                }
                Err(err) => {
                    issues.push(ConfigIssue::new(file.display().to_string(), err.to_string()));
                    GutsConfig::default()
                }
            },
            None => GutsConfig::default(),
        };

        env::apply(&mut config, lookup, &mut issues);
        issues.extend(config.sanitize());

        Resolved {
            config,
            issues,
            source,
        }
    }

    /// Drops or resets every value that cannot be used, returning why.
    fn sanitize(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (key, slot) in [
            ("dump.path", &mut self.dump.path),
            ("load.path", &mut self.load.path),
        ] {
            let Some(path) = slot.take() else {
                continue;
            };
            let expanded = match path.to_str().map(expand_path) {
                Some(result) => result,
                None => Ok(path),
            };
            match expanded {
                Ok(path) if path.as_os_str().is_empty() => {
                    issues.push(ConfigIssue::new(key, "path must not be empty"));
                }
                Ok(path) => *slot = Some(path),
                Err(err) => issues.push(ConfigIssue::new(key, err)),
            }
        }

        if let Some(hash) = self.load.hash.take() {
            match normalize_digest(&hash) {
                Ok(hash) => self.load.hash = Some(hash),
                Err(err) => issues.push(ConfigIssue::new("load.hash", err)),
            }
        }

        if self.load.compiler == ShaderCompiler::Shaderc && !cfg!(feature = "shaderc") {
            issues.push(ConfigIssue::new(
                "load.compiler",
                "shaderc support is not enabled in this build",
            ));
            self.load.compiler = ShaderCompiler::Naga;
        }

        if self.playback.poll_interval.is_zero() {
            issues.push(ConfigIssue::new(
                "playback.poll_interval",
                "poll interval must be greater than zero",
            ));
            self.playback.poll_interval = default_poll_interval();
        }

        if self.report.interval.is_zero() {
            issues.push(ConfigIssue::new(
                "report.interval",
                "report interval must be greater than zero",
            ));
            self.report.interval = default_report_interval();
        }

        issues
    }
}

/// Length of a hex-encoded SHA-1 digest.
pub const DIGEST_HEX_LEN: usize = 40;

fn normalize_digest(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.len() != DIGEST_HEX_LEN || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!(
            "expected a {DIGEST_HEX_LEN}-character hex digest, got '{trimmed}'"
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const DIGEST: &str = "0123456789ABCDEF0123456789abcdef01234567";

    const SAMPLE: &str = r#"
[dump]
path = "/tmp/guts-dumps"
language = "glsl"

[load]
path = "/tmp/replace.frag"
hash = "0123456789abcdef0123456789abcdef01234567"
language = "glsl"
compiler = "naga"

[playback]
pause_on_start = true
checkpoint = "vkQueuePresentKHR"
poll_interval = "50ms"

[report]
enabled = true
interval = 250
"#;

    fn no_file() -> ConfigPaths {
        ConfigPaths::from_raw(None, None)
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parses_sample_config() {
        let config = GutsConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.dump.path.as_deref(), Some(Path::new("/tmp/guts-dumps")));
        assert_eq!(config.dump.language, ShaderLanguage::Glsl);
        assert_eq!(config.load.compiler, ShaderCompiler::Naga);
        assert!(config.load.path.is_some());
        assert!(config.load.hash.is_some());
        assert!(config.playback.pause_on_start);
        assert_eq!(config.playback.checkpoint, CheckpointFunction::QueuePresent);
        assert_eq!(config.playback.poll_interval, Duration::from_millis(50));
        assert_eq!(config.report.interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_malformed_digest() {
        let err = GutsConfig::from_toml_str("[load]\nhash = \"abc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn defaults_are_observe_nothing() {
        let resolved = GutsConfig::resolve_with(&no_file(), |_| None);
        assert!(resolved.issues.is_empty());
        assert_eq!(resolved.config, GutsConfig::default());
        assert!(resolved.config.dump.path.is_none());
        assert!(resolved.config.load.path.is_none());
        assert!(resolved.config.load.hash.is_none());
        assert!(!resolved.config.playback.pause_on_start);
        assert_eq!(
            resolved.config.playback.checkpoint,
            CheckpointFunction::AcquireNextImage
        );
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("guts.toml");
        fs::write(&file, SAMPLE).unwrap();

        let resolved = GutsConfig::resolve_with(
            &ConfigPaths::from_raw(Some(dir.path().to_path_buf()), Some(file.clone())),
            env_from(&[
                (env::ENV_DUMP_TYPE, "spirv"),
                (env::ENV_PAUSE, "function:vkCmdBindPipeline"),
                (env::ENV_LOAD_HASH, DIGEST),
            ]),
        );

        assert!(resolved.issues.is_empty(), "{:?}", resolved.issues);
        assert_eq!(resolved.source.as_deref(), Some(file.as_path()));
        assert_eq!(resolved.config.dump.language, ShaderLanguage::Spirv);
        assert_eq!(
            resolved.config.playback.checkpoint,
            CheckpointFunction::CmdBindPipeline
        );
        assert_eq!(
            resolved.config.load.hash.as_deref(),
            Some(DIGEST.to_ascii_lowercase().as_str())
        );
    }

    #[test]
    fn bad_values_become_issues_not_failures() {
        let resolved = GutsConfig::resolve_with(
            &no_file(),
            env_from(&[
                (env::ENV_DUMP_PATH, "/tmp/dumps"),
                (env::ENV_LOAD_PATH, "/tmp/shader.spv"),
                (env::ENV_LOAD_HASH, "not-a-digest"),
                (env::ENV_PAUSE, "function:vkDoesNotExist"),
                (env::ENV_POLL_INTERVAL, "0"),
            ]),
        );

        let keys: Vec<&str> = resolved.issues.iter().map(|i| i.key.as_str()).collect();
        assert!(keys.contains(&env::ENV_PAUSE));
        assert!(keys.contains(&"load.hash"));
        assert!(keys.contains(&"playback.poll_interval"));
        assert_eq!(
            resolved.config.dump.path.as_deref(),
            Some(Path::new("/tmp/dumps"))
        );
        assert!(resolved.config.load.hash.is_none());
        assert!(!resolved.config.playback.pause_on_start);
        assert_eq!(resolved.config.playback.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("guts.toml");
        fs::write(&file, "[dump\npath = ").unwrap();

        let resolved = GutsConfig::resolve_with(
            &ConfigPaths::from_raw(None, Some(file)),
            |_| None,
        );
        assert_eq!(resolved.issues.len(), 1);
        assert!(resolved.source.is_none());
        assert_eq!(resolved.config, GutsConfig::default());
    }

    #[test]
    fn from_file_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GutsConfig::from_file(&dir.path().join("absent.toml")),
            Err(ConfigError::Read { .. })
        ));

        let file = dir.path().join("guts.toml");
        fs::write(&file, "[playback]\ncheckpoint = \"vkDraw\"\n").unwrap();
        assert!(matches!(
            GutsConfig::from_file(&file),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = GutsConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        let reparsed = GutsConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[cfg(not(feature = "shaderc"))]
    #[test]
    fn shaderc_is_rejected_when_not_built_in() {
        assert!("shaderc".parse::<ShaderCompiler>().is_err());
        assert_eq!(ShaderCompiler::default(), ShaderCompiler::Naga);

        let resolved = GutsConfig::resolve_with(
            &no_file(),
            env_from(&[(env::ENV_COMPILER, "shaderc")]),
        );
        assert_eq!(resolved.issues.len(), 1);
        assert_eq!(resolved.issues[0].key, env::ENV_COMPILER);
        assert_eq!(resolved.config.load.compiler, ShaderCompiler::Naga);

        assert!(matches!(
            GutsConfig::from_toml_str("[load]\ncompiler = \"shaderc\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[cfg(feature = "shaderc")]
    #[test]
    fn shaderc_is_the_default_when_built_in() {
        assert_eq!("glslang".parse::<ShaderCompiler>(), Ok(ShaderCompiler::Shaderc));
        assert_eq!(ShaderCompiler::default(), ShaderCompiler::Shaderc);
        let config = GutsConfig::from_toml_str("[load]\ncompiler = \"shaderc\"\n").unwrap();
        assert_eq!(config.load.compiler, ShaderCompiler::Shaderc);
    }
}
