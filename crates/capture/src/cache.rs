use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Bytecode of created shader modules, keyed by the driver's module handle,
/// so pipeline creation can dump stages that only reference a module.
///
/// Entries are never evicted; a handle the driver reuses overwrites the old
/// bytes.
#[derive(Debug, Default)]
pub struct ModuleCache {
    modules: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: u64, code: &[u8]) {
        self.modules.lock().insert(handle, Arc::from(code));
    }

    pub fn get(&self, handle: u64) -> Option<Arc<[u8]>> {
        self.modules.lock().get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
