//! Proactive triggers: guarded, cooldown-limited handlers that may raise a
//! proactive message in response to session events.

pub mod builtin;
pub mod priority;
pub mod registry;

pub use priority::{filter_expired, highest_priority, is_expired, sort_by_priority};
pub use registry::{
    ExternalEvent, TriggerCategory, TriggerContext, TriggerDefinition, TriggerRegistry,
};
