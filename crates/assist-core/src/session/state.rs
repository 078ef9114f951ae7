use crate::action::ActionDescriptor;
use crate::error::{AssistError, Result};
use crate::message::{Message, ProactiveMessage};
use crate::mode::{contextual_actions, mode_for_view, ContextFlags};
use crate::triggers::priority::filter_expired_at;
use crate::types::{EntityType, Mode, View};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// What the host passes in when the user selects an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySelection {
    pub id: String,
    pub entity_type: EntityType,
    pub status: String,
}

impl EntitySelection {
    pub fn new(id: impl Into<String>, entity_type: EntityType, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            status: status.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedEntity {
    pub id: String,
    pub entity_type: EntityType,
    pub status: String,
    pub selected_at: DateTime<Utc>,
}

/// Externally supplied project facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_score: Option<u32>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub pending_confirmations: u32,
    #[serde(default)]
    pub entity_counts: BTreeMap<EntityType, u32>,
}

/// A partial update: every `Some` field replaces the matching field of
/// [`ProjectData`], every `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_confirmations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_counts: Option<BTreeMap<EntityType, u32>>,
}

impl ProjectData {
    pub fn merge(&mut self, patch: ProjectDataPatch) {
        if let Some(score) = patch.readiness_score {
            self.readiness_score = Some(score);
        }
        if let Some(blockers) = patch.blockers {
            self.blockers = blockers;
        }
        if let Some(warnings) = patch.warnings {
            self.warnings = warnings;
        }
        if let Some(pending) = patch.pending_confirmations {
            self.pending_confirmations = pending;
        }
        if let Some(counts) = patch.entity_counts {
            self.entity_counts = counts;
        }
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Every way the session can change. Applied by [`Session::apply`].
#[derive(Debug, Clone)]
pub enum Transition {
    SetView(View),
    /// Override the mode derived from the view until the next `SetView`.
    SetMode(Mode),
    SelectEntity(Option<EntitySelection>),
    AppendMessage(Message),
    PatchMessage { id: Uuid, content: String },
    SetLoading(bool),
    ReplaceSuggestedActions(Vec<ActionDescriptor>),
    AppendProactive(ProactiveMessage),
    RemoveProactive(usize),
    MergeProjectData(ProjectDataPatch),
    PruneExpired { now: DateTime<Utc> },
    ClearMessages,
    Reset,
}

impl Transition {
    pub fn kind(&self) -> &'static str {
        match self {
            Transition::SetView(_) => "set_view",
            Transition::SetMode(_) => "set_mode",
            Transition::SelectEntity(_) => "select_entity",
            Transition::AppendMessage(_) => "append_message",
            Transition::PatchMessage { .. } => "patch_message",
            Transition::SetLoading(_) => "set_loading",
            Transition::ReplaceSuggestedActions(_) => "replace_suggested_actions",
            Transition::AppendProactive(_) => "append_proactive",
            Transition::RemoveProactive(_) => "remove_proactive",
            Transition::MergeProjectData(_) => "merge_project_data",
            Transition::PruneExpired { .. } => "prune_expired",
            Transition::ClearMessages => "clear_messages",
            Transition::Reset => "reset",
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    pub project_id: String,
    pub active_view: View,
    mode_override: Option<Mode>,
    pub selected_entity: Option<SelectedEntity>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub suggested_actions: Vec<ActionDescriptor>,
    pub pending_proactive_messages: Vec<ProactiveMessage>,
    pub project_data: ProjectData,
}

impl Session {
    pub fn new(project_id: impl Into<String>) -> Self {
        let mut session = Self {
            project_id: project_id.into(),
            active_view: View::default(),
            mode_override: None,
            selected_entity: None,
            messages: Vec::new(),
            is_loading: false,
            suggested_actions: Vec::new(),
            pending_proactive_messages: Vec::new(),
            project_data: ProjectData::default(),
        };
        session.recompute_actions();
        session
    }

    /// The active mode: the explicit override if one is set, otherwise the
    /// mode mapped from the active view.
    pub fn mode(&self) -> Mode {
        self.mode_override
            .unwrap_or_else(|| mode_for_view(&self.active_view))
    }

    pub fn context_flags(&self) -> ContextFlags {
        ContextFlags {
            has_selection: self.selected_entity.is_some(),
            pending_confirmations: self.project_data.pending_confirmations,
            blocker_count: self.project_data.blockers.len(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Remove the pending message at `index` if it may be dismissed. The
    /// check and the removal see the same queue.
    pub fn dismiss_proactive(&mut self, index: usize) -> Result<()> {
        let len = self.pending_proactive_messages.len();
        match self.pending_proactive_messages.get(index).map(|m| m.dismissable) {
            None => Err(AssistError::ProactiveIndex { index, len }),
            Some(false) => Err(AssistError::NotDismissable(index)),
            Some(true) => self.apply(Transition::RemoveProactive(index)),
        }
    }

    fn recompute_actions(&mut self) {
        self.suggested_actions = contextual_actions(self.mode(), &self.context_flags());
    }

    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        match transition {
            Transition::SetView(view) => {
                self.active_view = view;
                self.mode_override = None;
                self.recompute_actions();
            }
            Transition::SetMode(mode) => {
                self.mode_override = Some(mode);
                self.recompute_actions();
            }
            Transition::SelectEntity(selection) => {
                self.selected_entity = selection.map(|s| SelectedEntity {
                    id: s.id,
                    entity_type: s.entity_type,
                    status: s.status,
                    selected_at: Utc::now(),
                });
                self.recompute_actions();
            }
            Transition::AppendMessage(message) => self.messages.push(message),
            Transition::PatchMessage { id, content } => {
                match self.messages.iter_mut().find(|m| m.id == id) {
                    Some(m) => m.content = content,
                    None => tracing::debug!(%id, "patch for unknown message ignored"),
                }
            }
            Transition::SetLoading(loading) => self.is_loading = loading,
            Transition::ReplaceSuggestedActions(actions) => self.suggested_actions = actions,
            Transition::AppendProactive(message) => self.pending_proactive_messages.push(message),
            Transition::RemoveProactive(index) => {
                let len = self.pending_proactive_messages.len();
                if index >= len {
                    return Err(AssistError::ProactiveIndex { index, len });
                }
                self.pending_proactive_messages.remove(index);
            }
            Transition::MergeProjectData(patch) => {
                self.project_data.merge(patch);
                self.recompute_actions();
            }
            Transition::PruneExpired { now } => {
                let pending = std::mem::take(&mut self.pending_proactive_messages);
                self.pending_proactive_messages = filter_expired_at(pending, now);
            }
            Transition::ClearMessages => self.messages = Vec::new(),
            Transition::Reset => *self = Session::new(std::mem::take(&mut self.project_id)),
        }
        Ok(())
    }

    /// Compact JSON view of the session, sent to the completion service as
    /// conversational context.
    pub fn context_json(&self, recent_messages: usize) -> serde_json::Value {
        let skip = self.messages.len().saturating_sub(recent_messages);
        let recent: Vec<_> = self
            .messages
            .iter()
            .skip(skip)
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();
        serde_json::json!({
            "project_id": self.project_id,
            "view": self.active_view,
            "mode": self.mode(),
            "selected_entity": self.selected_entity,
            "project_data": self.project_data,
            "recent_messages": recent,
        })
    }
}
