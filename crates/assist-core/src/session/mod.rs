//! Session state and the orchestrator that drives it.

mod assistant;
mod state;

pub use assistant::{
    ActionOutcome, Assistant, AssistantBuilder, CompletionFn, RefreshFn, SessionEvent,
};
pub use state::{
    EntitySelection, ProjectData, ProjectDataPatch, SelectedEntity, Session, Transition,
};
