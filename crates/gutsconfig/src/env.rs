use std::path::PathBuf;

use crate::checkpoint::CheckpointFunction;
use crate::duration::parse_interval;
use crate::{ConfigIssue, GutsConfig};

pub const ENV_CONFIG_DIR: &str = "VK_SHADER_GUTS_CONFIG_DIR";
pub const ENV_CONFIG_FILE: &str = "VK_SHADER_GUTS_CONFIG";
pub const ENV_DUMP_PATH: &str = "VK_SHADER_GUTS_DUMP_PATH";
pub const ENV_DUMP_TYPE: &str = "VK_SHADER_GUTS_DUMP_TYPE";
pub const ENV_LOAD_PATH: &str = "VK_SHADER_GUTS_LOAD_PATH";
pub const ENV_LOAD_HASH: &str = "VK_SHADER_GUTS_LOAD_HASH";
pub const ENV_LOAD_TYPE: &str = "VK_SHADER_GUTS_LOAD_TYPE";
pub const ENV_COMPILER: &str = "VK_SHADER_GUTS_COMPILER";
pub const ENV_PAUSE: &str = "VK_SHADER_GUTS_PAUSE";
pub const ENV_POLL_INTERVAL: &str = "VK_SHADER_GUTS_POLL_INTERVAL";
pub const ENV_REPORT: &str = "VK_SHADER_GUTS_REPORT";
pub const ENV_LOG: &str = "VK_SHADER_GUTS_LOG";

/// Overlays environment switches on top of `config`. Values that fail to
/// parse leave the previous setting untouched and are reported as issues.
pub(crate) fn apply<F>(config: &mut GutsConfig, lookup: F, issues: &mut Vec<ConfigIssue>)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(raw) = get(ENV_DUMP_PATH) {
        config.dump.path = Some(PathBuf::from(raw));
    }
    if let Some(raw) = get(ENV_DUMP_TYPE) {
        match raw.parse() {
            Ok(language) => config.dump.language = language,
            Err(err) => issues.push(ConfigIssue::new(ENV_DUMP_TYPE, err)),
        }
    }

    if let Some(raw) = get(ENV_LOAD_PATH) {
        config.load.path = Some(PathBuf::from(raw));
    }
    if let Some(raw) = get(ENV_LOAD_HASH) {
        config.load.hash = Some(raw.trim().to_string());
    }
    if let Some(raw) = get(ENV_LOAD_TYPE) {
        match raw.parse() {
            Ok(language) => config.load.language = language,
            Err(err) => issues.push(ConfigIssue::new(ENV_LOAD_TYPE, err)),
        }
    }
    if let Some(raw) = get(ENV_COMPILER) {
        match raw.parse() {
            Ok(compiler) => config.load.compiler = compiler,
            Err(err) => issues.push(ConfigIssue::new(ENV_COMPILER, err)),
        }
    }

    if let Some(raw) = get(ENV_PAUSE) {
        match parse_pause(&raw) {
            Ok((pause, checkpoint)) => {
                config.playback.pause_on_start = pause;
                if let Some(checkpoint) = checkpoint {
                    config.playback.checkpoint = checkpoint;
                }
            }
            Err(err) => issues.push(ConfigIssue::new(ENV_PAUSE, err)),
        }
    }
    if let Some(raw) = get(ENV_POLL_INTERVAL) {
        match parse_interval(&raw) {
            Ok(interval) => config.playback.poll_interval = interval,
            Err(err) => issues.push(ConfigIssue::new(ENV_POLL_INTERVAL, err)),
        }
    }

    if let Some(raw) = get(ENV_REPORT) {
        match parse_flag(&raw) {
            Ok(enabled) => config.report.enabled = enabled,
            Err(err) => issues.push(ConfigIssue::new(ENV_REPORT, err)),
        }
    }
}

pub fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean (true/false/1/0), got '{other}'")),
    }
}

/// `true` pauses at the configured checkpoint; `function:<vkName>` pauses at
/// the named entry point.
pub fn parse_pause(raw: &str) -> Result<(bool, Option<CheckpointFunction>), String> {
    let trimmed = raw.trim();
    if let Some((kind, target)) = trimmed.split_once(':') {
        if !kind.trim().eq_ignore_ascii_case("function") {
            return Err(format!(
                "unsupported checkpoint kind '{}'; expected 'function:<vkName>'",
                kind.trim()
            ));
        }
        let function = target.parse::<CheckpointFunction>()?;
        return Ok((true, Some(function)));
    }
    parse_flag(trimmed).map(|pause| (pause, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_accepts_flag_or_function_pair() {
        assert_eq!(parse_pause("true"), Ok((true, None)));
        assert_eq!(parse_pause("0"), Ok((false, None)));
        assert_eq!(
            parse_pause("function:vkQueuePresentKHR"),
            Ok((true, Some(CheckpointFunction::QueuePresent)))
        );
        assert!(parse_pause("frame:10").is_err());
        assert!(parse_pause("function:vkNope").is_err());
    }
}
