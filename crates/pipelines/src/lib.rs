//! Registry of every pipeline object the host created and the subset it bound
//! during the current frame window.
//!
//! Types:
//! - `PipelineLibrary` owns the canonical records behind a single `RwLock`.
//! - `PipelineRecord` is the value copy handed to readers.
//! - `PipelineKind` / `PipelineHandle` describe where a record came from.
//!
//! Writers are the intercepted creation and bind call sites; readers poll
//! `ready_to_pull` and then take snapshots with `all_pipelines` and
//! `used_last_frame`.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

/// Opaque driver handle value of a pipeline or shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PipelineHandle(pub u64);

impl PipelineHandle {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for PipelineHandle {
    fn from(raw: u64) -> Self {
        PipelineHandle(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineKind {
    Graphics,
    Compute,
    ShaderObject,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineKind::Graphics => "graphics",
            PipelineKind::Compute => "compute",
            PipelineKind::ShaderObject => "shader-object",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRecord {
    /// Unique for the life of the process and increasing in insertion order.
    pub index: u64,
    pub origin: PipelineHandle,
    /// Replacement handle for hot-swapped pipelines. Never populated yet.
    pub edited_handle: Option<PipelineHandle>,
    pub kind: PipelineKind,
    /// Wall-clock time spent in the driver's creation call, in milliseconds.
    pub duration_ms: f32,
    pub edited: bool,
    pub result: bool,
}

/// Shared by every registry so an index is never handed out twice.
static NEXT_INDEX: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct LibraryState {
    all: Vec<PipelineRecord>,
    /// Position in `all` of the latest record for each origin handle.
    by_handle: HashMap<PipelineHandle, usize>,
    used: Vec<PipelineRecord>,
    used_handles: HashSet<PipelineHandle>,
}

#[derive(Debug)]
pub struct PipelineLibrary {
    state: RwLock<LibraryState>,
    ready: AtomicBool,
}

impl Default for PipelineLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLibrary {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LibraryState::default()),
            ready: AtomicBool::new(true),
        }
    }

    /// Appends a record for a pipeline the driver just returned. Returns the
    /// freshly minted index.
    pub fn add_pipeline(
        &self,
        kind: PipelineKind,
        duration_ms: f32,
        result: bool,
        origin: PipelineHandle,
    ) -> u64 {
        let index = {
            let mut state = self.state.write();
            // Minted under the write lock so `all` stays in index order.
            let index = NEXT_INDEX.fetch_add(1, Ordering::Relaxed);
            let position = state.all.len();
            state.all.push(PipelineRecord {
                index,
                origin,
                edited_handle: None,
                kind,
                duration_ms,
                edited: false,
                result,
            });
            state.by_handle.insert(origin, position);
            index
        };
        self.ready.store(false, Ordering::Release);
        trace!(index, handle = %origin, %kind, duration_ms, result, "recorded pipeline");
        index
    }

    /// Records that `origin` was bound in the current frame window. Unknown
    /// handles are ignored.
    pub fn mark_used(&self, origin: PipelineHandle) {
        let mut state = self.state.write();
        let Some(&position) = state.by_handle.get(&origin) else {
            return;
        };
        if state.used_handles.insert(origin) {
            let record = state.all[position].clone();
            state.used.push(record);
        }
        drop(state);
        self.ready.store(false, Ordering::Release);
    }

    pub fn end_of_frame(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Starts a new frame window.
    pub fn reset_used(&self) {
        let mut state = self.state.write();
        state.used.clear();
        state.used_handles.clear();
        drop(state);
        self.ready.store(false, Ordering::Release);
    }

    pub fn ready_to_pull(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn all_pipelines(&self) -> Vec<PipelineRecord> {
        self.state.read().all.clone()
    }

    pub fn used_last_frame(&self) -> Vec<PipelineRecord> {
        self.state.read().used.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn handle(raw: u64) -> PipelineHandle {
        PipelineHandle(raw)
    }

    #[test]
    fn frame_window_scenario() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::Graphics, 1.25, true, handle(0x10));

        let all = library.all_pipelines();
        assert_eq!(all.len(), 1);
        assert!(all[0].index >= 1);
        assert_eq!(all[0].kind, PipelineKind::Graphics);
        assert!(all[0].result);
        assert!(!all[0].edited);
        assert_eq!(all[0].edited_handle, None);

        library.mark_used(handle(0x10));
        assert_eq!(library.used_last_frame().len(), 1);

        library.end_of_frame();
        assert!(library.ready_to_pull());

        library.reset_used();
        assert!(library.used_last_frame().is_empty());
        assert!(!library.ready_to_pull());
    }

    #[test]
    fn records_keep_call_order_and_increasing_indices() {
        let library = PipelineLibrary::new();
        let kinds = [
            PipelineKind::Compute,
            PipelineKind::Graphics,
            PipelineKind::ShaderObject,
            PipelineKind::Graphics,
        ];
        for (offset, kind) in kinds.iter().enumerate() {
            library.add_pipeline(*kind, offset as f32, offset % 2 == 0, handle(100 + offset as u64));
        }

        let all = library.all_pipelines();
        assert_eq!(all.len(), kinds.len());
        assert!(all.windows(2).all(|pair| pair[0].index < pair[1].index));
        let recorded: Vec<PipelineKind> = all.iter().map(|record| record.kind).collect();
        assert_eq!(recorded, kinds);
        assert_eq!(all[3].origin, handle(103));
    }

    #[test]
    fn indices_are_unique_across_registries() {
        let first = PipelineLibrary::new();
        let second = PipelineLibrary::new();
        let a = first.add_pipeline(PipelineKind::Graphics, 0.0, true, handle(1));
        let b = second.add_pipeline(PipelineKind::Graphics, 0.0, true, handle(1));
        let c = first.add_pipeline(PipelineKind::Compute, 0.0, true, handle(2));

        assert_ne!(a, b);
        assert!(a < c);
        assert_eq!(second.all_pipelines()[0].index, b);
    }

    #[test]
    fn unknown_handle_leaves_used_set_unchanged() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::Graphics, 0.5, true, handle(1));
        library.mark_used(handle(1));
        let before = library.used_last_frame();

        library.mark_used(handle(0xdead));
        assert_eq!(library.used_last_frame(), before);
    }

    #[test]
    fn marking_twice_yields_one_entry() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::Compute, 0.1, true, handle(7));
        library.add_pipeline(PipelineKind::Compute, 0.1, true, handle(8));
        library.mark_used(handle(7));
        library.mark_used(handle(7));
        library.mark_used(handle(8));

        let used = library.used_last_frame();
        assert_eq!(used.len(), 2);
        assert_eq!(used.iter().filter(|r| r.origin == handle(7)).count(), 1);
    }

    #[test]
    fn reset_clears_used_regardless_of_state() {
        let library = PipelineLibrary::new();
        library.reset_used();
        assert!(library.used_last_frame().is_empty());

        for raw in 1..=5 {
            library.add_pipeline(PipelineKind::Graphics, 0.0, true, handle(raw));
            library.mark_used(handle(raw));
        }
        library.end_of_frame();
        library.reset_used();
        assert!(library.used_last_frame().is_empty());
        assert_eq!(library.len(), 5);
    }

    #[test]
    fn end_of_frame_keeps_last_frame_visible() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::Graphics, 2.0, true, handle(3));
        library.mark_used(handle(3));
        library.end_of_frame();
        assert_eq!(library.used_last_frame().len(), 1);
        assert!(library.ready_to_pull());
    }

    #[test]
    fn reused_handle_resolves_to_latest_record() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::Graphics, 1.0, true, handle(9));
        let latest = library.add_pipeline(PipelineKind::Compute, 1.0, true, handle(9));
        library.mark_used(handle(9));

        let used = library.used_last_frame();
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].index, latest);
        assert_eq!(used[0].kind, PipelineKind::Compute);
    }

    #[test]
    fn creation_and_bind_clear_ready_flag() {
        let library = PipelineLibrary::new();
        assert!(library.ready_to_pull());
        library.add_pipeline(PipelineKind::Graphics, 0.0, false, handle(4));
        assert!(!library.ready_to_pull());
        library.end_of_frame();
        library.mark_used(handle(4));
        assert!(!library.ready_to_pull());
    }

    #[test]
    fn concurrent_writers_mint_unique_indices() {
        let library = Arc::new(PipelineLibrary::new());
        let workers: Vec<_> = (0..4u64)
            .map(|worker| {
                let library = Arc::clone(&library);
                thread::spawn(move || {
                    for n in 0..250u64 {
                        let raw = worker * 1_000 + n + 1;
                        library.add_pipeline(PipelineKind::Graphics, 0.0, true, handle(raw));
                        library.mark_used(handle(raw));
                        let _ = library.used_last_frame();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let all = library.all_pipelines();
        assert_eq!(all.len(), 1_000);
        assert!(all.windows(2).all(|pair| pair[0].index < pair[1].index));
        assert_eq!(library.used_last_frame().len(), 1_000);
    }

    #[test]
    fn records_serialize_for_external_viewers() {
        let library = PipelineLibrary::new();
        library.add_pipeline(PipelineKind::ShaderObject, 0.75, true, handle(0x20));
        let json = serde_json::to_value(library.all_pipelines()).unwrap();
        assert_eq!(json[0]["origin"], 0x20);
        assert_eq!(json[0]["kind"], "ShaderObject");
        assert_eq!(json[0]["edited_handle"], serde_json::Value::Null);
    }
}
