// Imports
use crate::camera::ViewportRecord;
use crate::snapshot::{CanvasSnapshot, UndoStackRecord};
use std::collections::HashMap;

/// The external persistence collaborator.
///
/// All calls are best-effort from the engine's point of view: failures are logged and the
/// session continues. The engine never awaits these from inside a gesture handler.
pub trait CanvasStorage: std::fmt::Debug {
    fn save_canvas_state(&mut self, snapshot: &CanvasSnapshot) -> anyhow::Result<()>;
    fn load_canvas_state(&mut self) -> anyhow::Result<Option<CanvasSnapshot>>;
    fn save_undo_stack(&mut self, stack: &UndoStackRecord) -> anyhow::Result<()>;
    fn load_undo_stack(&mut self) -> anyhow::Result<Option<UndoStackRecord>>;
    fn save_viewport(&mut self, record: &ViewportRecord) -> anyhow::Result<()>;
    fn load_viewport(&mut self) -> anyhow::Result<Option<ViewportRecord>>;
}

/// The external media resource store, keyed by content hash.
///
/// Written through on ingest; read on demand when rehydrating snapshots. Eviction is the
/// collaborator's business, the engine never assumes a resource is still present.
pub trait ResourceStore: std::fmt::Debug {
    fn put(&mut self, hash: &str, payload: Vec<u8>) -> anyhow::Result<()>;
    fn get(&self, hash: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn has(&self, hash: &str) -> bool;
}

/// An in-memory [CanvasStorage], used in tests and as a stand-in when no backend is attached.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    canvas: Option<CanvasSnapshot>,
    undo_stack: Option<UndoStackRecord>,
    viewport: Option<ViewportRecord>,
    /// When set, every save fails. Lets tests exercise the best-effort error paths.
    pub fail_saves: bool,
}

impl CanvasStorage for MemoryStorage {
    fn save_canvas_state(&mut self, snapshot: &CanvasSnapshot) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("storage quota exceeded");
        }
        self.canvas = Some(snapshot.clone());
        Ok(())
    }

    fn load_canvas_state(&mut self) -> anyhow::Result<Option<CanvasSnapshot>> {
        Ok(self.canvas.clone())
    }

    fn save_undo_stack(&mut self, stack: &UndoStackRecord) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("storage quota exceeded");
        }
        self.undo_stack = Some(stack.clone());
        Ok(())
    }

    fn load_undo_stack(&mut self) -> anyhow::Result<Option<UndoStackRecord>> {
        Ok(self.undo_stack.clone())
    }

    fn save_viewport(&mut self, record: &ViewportRecord) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("storage quota exceeded");
        }
        self.viewport = Some(*record);
        Ok(())
    }

    fn load_viewport(&mut self) -> anyhow::Result<Option<ViewportRecord>> {
        Ok(self.viewport.clone())
    }
}

/// An in-memory [ResourceStore].
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    payloads: HashMap<String, Vec<u8>>,
}

impl ResourceStore for MemoryResourceStore {
    fn put(&mut self, hash: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        self.payloads.insert(hash.to_string(), payload);
        Ok(())
    }

    fn get(&self, hash: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.payloads.get(hash).cloned())
    }

    fn has(&self, hash: &str) -> bool {
        self.payloads.contains_key(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::NodeRecord;

    #[test]
    fn memory_storage_roundtrip() {
        let mut storage = MemoryStorage::default();
        assert!(storage.load_canvas_state().unwrap().is_none());

        let snapshot = CanvasSnapshot {
            version: CanvasSnapshot::VERSION,
            nodes: vec![NodeRecord::default()],
        };
        storage.save_canvas_state(&snapshot).unwrap();
        let loaded = storage.load_canvas_state().unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 1);
    }

    #[test]
    fn failing_saves_surface_as_errors() {
        let mut storage = MemoryStorage::default();
        storage.fail_saves = true;
        assert!(storage.save_canvas_state(&CanvasSnapshot::default()).is_err());
        assert!(storage
            .save_undo_stack(&UndoStackRecord::default())
            .is_err());
    }

    #[test]
    fn resource_store_by_content_hash() {
        let mut resources = MemoryResourceStore::default();
        assert!(!resources.has("cafe"));
        resources.put("cafe", vec![1, 2, 3]).unwrap();
        assert!(resources.has("cafe"));
        assert_eq!(resources.get("cafe").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(resources.get("beef").unwrap(), None);
    }
}
