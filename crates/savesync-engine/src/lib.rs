pub mod collaborators;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod orchestrator;
pub mod save_data;
pub mod slot;
pub mod status;

pub use error::{EngineError, Result};
pub use orchestrator::{
    Collaborators, GameOutcome, Operation, RestoreOutcome, StoreReport, SyncOrchestrator,
    TargetReport,
};
pub use slot::{SlotRestore, SlotStore, StorageSlot};
