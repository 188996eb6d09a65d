//! Headless observer that polls the registry the way an interactive viewer
//! would and logs a summary whenever a new consistent frame is available.
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use pipelines::{PipelineLibrary, PipelineRecord};
use playback::PlaybackController;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSummary {
    pub frame: u64,
    pub total: usize,
    pub failed: usize,
    pub used: usize,
    /// Index and creation time of the slowest pipeline so far.
    pub slowest: Option<(u64, f32)>,
}

pub fn summarize(frame: u64, all: &[PipelineRecord], used: &[PipelineRecord]) -> FrameSummary {
    let slowest = all
        .iter()
        .max_by(|a, b| a.duration_ms.total_cmp(&b.duration_ms))
        .map(|record| (record.index, record.duration_ms));
    FrameSummary {
        frame,
        total: all.len(),
        failed: all.iter().filter(|record| !record.result).count(),
        used: used.len(),
        slowest,
    }
}

/// Stops and joins the observer thread when dropped.
#[derive(Debug)]
pub struct FrameReporter {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl FrameReporter {
    pub fn spawn(
        library: Arc<PipelineLibrary>,
        playback: Arc<PlaybackController>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop, stopped) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("guts-reporter".into())
            .spawn(move || {
                debug!(?interval, "frame reporter started");
                let mut last: Option<FrameSummary> = None;
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if !library.ready_to_pull() {
                        continue;
                    }
                    let summary = summarize(
                        playback.frame_count(),
                        &library.all_pipelines(),
                        &library.used_last_frame(),
                    );
                    if last.as_ref() == Some(&summary) {
                        continue;
                    }
                    match summary.slowest {
                        Some((index, ms)) => info!(
                            frame = summary.frame,
                            pipelines = summary.total,
                            failed = summary.failed,
                            used = summary.used,
                            slowest_index = index,
                            slowest_ms = ms,
                            "frame summary"
                        ),
                        None => info!(frame = summary.frame, used = summary.used, "frame summary"),
                    }
                    last = Some(summary);
                }
                debug!("frame reporter stopped");
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for FrameReporter {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("frame reporter thread panicked");
            }
        }
    }
}
