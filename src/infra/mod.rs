//! Infrastructure adapters: HTTP automation client, snapshot file, in-memory recorder.

pub mod automation;
pub mod recorder;
pub mod snapshot;

pub use automation::HttpAutomationClient;
pub use recorder::{HistoryEntry, InMemoryRecorder, StatusUpdate};
pub use snapshot::{read_snapshot, write_snapshot, Snapshot, SnapshotMetadata, SnapshotRecord};
