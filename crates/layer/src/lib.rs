//! Instrumentation context shared by every intercepted Vulkan entry point.
//!
//! The loader glue builds one [`Instrumentation`] when the layer is attached
//! and hands it to each call site. The hooks in this crate take the forwarded
//! driver call as a closure so pre-hook, forward and post-hook always run in
//! that order and the driver call always happens.
mod hooks;
pub mod reporter;

use std::sync::Arc;

use capture::ShaderCapture;
use gutsconfig::env::ENV_LOG;
use gutsconfig::GutsConfig;
use parking_lot::Mutex;
use pipelines::PipelineLibrary;
use playback::PlaybackController;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use hooks::{stage_from_flags, PipelineBatch};
pub use reporter::{FrameReporter, FrameSummary};

#[derive(Debug)]
pub struct Instrumentation {
    config: GutsConfig,
    library: Arc<PipelineLibrary>,
    playback: Arc<PlaybackController>,
    capture: ShaderCapture,
    reporter: Mutex<Option<FrameReporter>>,
}

impl Instrumentation {
    /// Resolves configuration from the process environment, installs logging
    /// and builds the context. Never fails; unusable settings are logged.
    pub fn attach() -> Arc<Self> {
        init_tracing();
        let resolved = GutsConfig::resolve();
        if let Some(source) = &resolved.source {
            info!(path = %source.display(), "loaded shader guts configuration");
        }
        resolved.log_issues();
        Self::from_config(resolved.config)
    }

    pub fn from_config(config: GutsConfig) -> Arc<Self> {
        let library = Arc::new(PipelineLibrary::new());
        let playback = Arc::new(PlaybackController::from_config(&config.playback));
        let capture = ShaderCapture::from_config(&config);

        let reporter = if config.report.enabled {
            match FrameReporter::spawn(
                Arc::clone(&library),
                Arc::clone(&playback),
                config.report.interval,
            ) {
                Ok(reporter) => Some(reporter),
                Err(err) => {
                    warn!("frame reporter disabled: {err}");
                    None
                }
            }
        } else {
            None
        };

        Arc::new(Self {
            config,
            library,
            playback,
            capture,
            reporter: Mutex::new(reporter),
        })
    }

    pub fn config(&self) -> &GutsConfig {
        &self.config
    }

    pub fn library(&self) -> &Arc<PipelineLibrary> {
        &self.library
    }

    pub fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    pub fn capture(&self) -> &ShaderCapture {
        &self.capture
    }

    pub fn reporting(&self) -> bool {
        self.reporter.lock().is_some()
    }

    /// Stops the frame reporter, if running.
    pub fn detach(&self) {
        if self.reporter.lock().take().is_some() {
            info!("frame reporter stopped");
        }
    }
}

/// Installs a stderr subscriber filtered by `VK_SHADER_GUTS_LOG`. Leaves an
/// existing global subscriber owned by the host in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn default_context_is_observe_only() {
        let guts = Instrumentation::from_config(GutsConfig::default());
        assert!(!guts.capture().dump_enabled());
        assert!(!guts.capture().load_enabled());
        assert!(!guts.reporting());
        assert!(guts.playback().status().running);
        assert!(guts.library().is_empty());
    }

    #[test]
    fn reporter_follows_config_and_stops_on_detach() {
        let mut config = GutsConfig::default();
        config.report.enabled = true;
        config.report.interval = Duration::from_millis(10);
        let guts = Instrumentation::from_config(config);
        assert!(guts.reporting());
        guts.detach();
        assert!(!guts.reporting());
    }

    #[test]
    fn init_tracing_tolerates_repeat_calls() {
        init_tracing();
        init_tracing();
    }
}
