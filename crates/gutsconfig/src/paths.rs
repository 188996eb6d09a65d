//! Filesystem conventions shared by the layer and `gutsctl`.
//!
//! - `ConfigPaths` locates the per-user configuration directory (overridable
//!   through `VK_SHADER_GUTS_CONFIG_DIR`) and the optional `guts.toml` file.
//! - `expand_path` performs `$VAR`, `${VAR}` and `~` expansion on the path
//!   switches so dump/load roots behave the same in the environment and in
//!   the TOML file.
use std::env;
use std::path::{Path, PathBuf};

use directories_next::{BaseDirs, ProjectDirs};
use tracing::debug;

use crate::env::{ENV_CONFIG_DIR, ENV_CONFIG_FILE};

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "VkShaderGuts";
const APPLICATION: &str = "VkShaderGUTS";
const CONFIG_FILE: &str = "guts.toml";

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    config_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Resolves directories from the environment, falling back to the
    /// platform's per-user config location. Never fails: a host without a
    /// home directory simply has no config file.
    pub fn discover() -> Self {
        let config_dir = env_override(ENV_CONFIG_DIR).or_else(|| {
            ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
                .map(|dirs| dirs.config_dir().to_path_buf())
        });
        let config_file = env_override(ENV_CONFIG_FILE)
            .or_else(|| config_dir.as_ref().map(|dir| dir.join(CONFIG_FILE)));
        debug!(dir = ?config_dir, file = ?config_file, "resolved shader guts config paths");
        Self {
            config_dir,
            config_file,
        }
    }

    pub fn from_raw(config_dir: Option<PathBuf>, config_file: Option<PathBuf>) -> Self {
        Self {
            config_dir,
            config_file,
        }
    }

    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

/// Expands `$VAR`, `${VAR}` and a leading `~` in `input`.
pub fn expand_path(input: &str) -> Result<PathBuf, String> {
    let expanded_env = expand_env_vars(input)?;
    let expanded = expand_home(&expanded_env)?;
    let path = PathBuf::from(expanded);
    debug!(original = %input, expanded = %path.display(), "expanded configured path");
    Ok(path)
}

fn expand_home(input: &str) -> Result<String, String> {
    if !input.starts_with('~') {
        return Ok(input.to_string());
    }

    let base_dirs = BaseDirs::new()
        .ok_or_else(|| "unable to determine home directory for '~' expansion".to_string())?;
    let home_dir = base_dirs.home_dir();

    if input == "~" {
        return Ok(home_dir.to_string_lossy().into_owned());
    }

    if let Some(rest) = input.strip_prefix("~/") {
        return Ok(home_dir.join(rest).to_string_lossy().into_owned());
    }

    Err(format!(
        "user-specific home expansion ('{input}') is not supported"
    ))
}

fn expand_env_vars(input: &str) -> Result<String, String> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            output.push(chars.next().unwrap_or('\\'));
            continue;
        }

        if ch != '$' {
            output.push(ch);
            continue;
        }

        match chars.peek() {
            None => {
                output.push('$');
                break;
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    return Err("missing closing '}' in environment variable reference".into());
                }
                if name.is_empty() {
                    return Err("environment variable name must not be empty".into());
                }
                output.push_str(&lookup(&name)?);
            }
            Some(&c) if is_env_name_char(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_env_name_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                output.push_str(&lookup(&name)?);
            }
            _ => output.push('$'),
        }
    }

    Ok(output)
}

fn lookup(name: &str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("environment variable '{name}' is not set"))
}

fn is_env_name_char(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_environment_variables() {
        env::set_var("GUTS_PATH_TEST", "value");
        assert_eq!(
            expand_path("/tmp/$GUTS_PATH_TEST/${GUTS_PATH_TEST}").unwrap(),
            PathBuf::from("/tmp/value/value")
        );
        env::remove_var("GUTS_PATH_TEST");
    }

    #[test]
    fn missing_variable_is_reported() {
        let err = expand_path("/tmp/$GUTS_UNSET_FOR_TEST").unwrap_err();
        assert!(err.contains("GUTS_UNSET_FOR_TEST"));
    }

    #[test]
    fn expands_home_prefix() {
        assert!(expand_path("~").unwrap().is_absolute());
        assert!(expand_path("~bob/dumps").is_err());
    }

    #[test]
    fn escaped_dollar_is_literal() {
        assert_eq!(expand_path(r"/tmp/\$HOME").unwrap(), PathBuf::from("/tmp/$HOME"));
    }
}
