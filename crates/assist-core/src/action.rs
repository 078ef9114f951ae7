//! Quick-action descriptors offered next to the chat.
//!
//! Actions are transient: they are recomputed whenever mode, selection or
//! project data change and are never persisted. An action does one of three
//! things when the host invokes it: run a command string, call a direct
//! callback, or navigate to a view.

use crate::types::{ActionVariant, EntityType, View};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// NavigationTarget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTarget {
    pub view: View,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl NavigationTarget {
    pub fn view(view: View) -> Self {
        Self {
            view,
            entity_type: None,
            entity_id: None,
        }
    }

    pub fn entity(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            view: entity_type.home_view(),
            entity_type: Some(entity_type),
            entity_id: Some(id.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionCallback
// ---------------------------------------------------------------------------

/// A host-supplied callback run directly when the action is invoked.
#[derive(Clone)]
pub struct ActionCallback(Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>);

impl ActionCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub async fn invoke(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

impl fmt::Debug for ActionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionCallback(..)")
    }
}

// ---------------------------------------------------------------------------
// ActionDescriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip)]
    pub callback: Option<ActionCallback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate: Option<NavigationTarget>,
    #[serde(default)]
    pub variant: ActionVariant,
}

impl ActionDescriptor {
    fn bare(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            command: None,
            callback: None,
            navigate: None,
            variant: ActionVariant::Default,
        }
    }

    /// An action that runs `command` (a full `/name args` string).
    pub fn command(
        id: impl Into<String>,
        label: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::bare(id, label)
        }
    }

    pub fn navigation(
        id: impl Into<String>,
        label: impl Into<String>,
        target: NavigationTarget,
    ) -> Self {
        Self {
            navigate: Some(target),
            ..Self::bare(id, label)
        }
    }

    pub fn callback(
        id: impl Into<String>,
        label: impl Into<String>,
        callback: ActionCallback,
    ) -> Self {
        Self {
            callback: Some(callback),
            ..Self::bare(id, label)
        }
    }

    pub fn with_variant(mut self, variant: ActionVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Name of the command this action runs, lowercased, without the slash.
    pub fn command_name(&self) -> Option<String> {
        let cmd = self.command.as_deref()?.trim();
        let rest = cmd.strip_prefix('/')?;
        rest.split_whitespace()
            .next()
            .map(|name| name.to_ascii_lowercase())
    }

    /// True if this action is bound to the command `name`.
    pub fn targets_command(&self, name: &str) -> bool {
        self.command_name()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}
