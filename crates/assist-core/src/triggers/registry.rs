//! Proactive trigger registry and evaluator.
//!
//! Within one category evaluation is first-match in registration order, not
//! priority-ranked. A trigger is skipped while inside its cooldown window or
//! when its guard rejects the context. A handler that fails or panics is
//! logged and skipped so it never blocks the triggers after it. The
//! last-fired timestamp is stamped only when a handler returns a message.

use crate::message::ProactiveMessage;
use crate::session::Session;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// TriggerCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    ViewChanged,
    EntitySelected,
    Idle,
    Periodic,
    ExternalAdded,
    ExternalProcessed,
}

impl TriggerCategory {
    /// All categories, in the order bulk evaluation visits them.
    pub fn all() -> &'static [TriggerCategory] {
        &[
            TriggerCategory::ViewChanged,
            TriggerCategory::EntitySelected,
            TriggerCategory::Idle,
            TriggerCategory::Periodic,
            TriggerCategory::ExternalAdded,
            TriggerCategory::ExternalProcessed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerCategory::ViewChanged => "view_changed",
            TriggerCategory::EntitySelected => "entity_selected",
            TriggerCategory::Idle => "idle",
            TriggerCategory::Periodic => "periodic",
            TriggerCategory::ExternalAdded => "external_added",
            TriggerCategory::ExternalProcessed => "external_processed",
        }
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExternalEvent / TriggerContext
// ---------------------------------------------------------------------------

/// Background activity reported by the host (imports, analysis jobs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalEvent {
    ItemsAdded {
        kind: String,
        count: u32,
    },
    ProcessingComplete {
        kind: String,
        succeeded: u32,
        failed: u32,
    },
}

impl ExternalEvent {
    pub fn category(&self) -> TriggerCategory {
        match self {
            ExternalEvent::ItemsAdded { .. } => TriggerCategory::ExternalAdded,
            ExternalEvent::ProcessingComplete { .. } => TriggerCategory::ExternalProcessed,
        }
    }
}

/// What guards and handlers see: a snapshot of the session taken when
/// evaluation started, plus the external event for external categories.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub session: Session,
    pub event: Option<ExternalEvent>,
}

impl TriggerContext {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            event: None,
        }
    }

    pub fn with_event(session: Session, event: ExternalEvent) -> Self {
        Self {
            session,
            event: Some(event),
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerDefinition
// ---------------------------------------------------------------------------

pub type TriggerFuture = BoxFuture<'static, anyhow::Result<Option<ProactiveMessage>>>;
pub type TriggerGuard = Arc<dyn Fn(&TriggerContext) -> bool + Send + Sync>;
pub type TriggerHandler = Arc<dyn Fn(TriggerContext) -> TriggerFuture + Send + Sync>;

#[derive(Clone)]
pub struct TriggerDefinition {
    pub id: String,
    pub category: TriggerCategory,
    pub guard: Option<TriggerGuard>,
    pub handler: TriggerHandler,
    pub cooldown: Duration,
}

impl TriggerDefinition {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        category: TriggerCategory,
        cooldown: Duration,
        handler: F,
    ) -> Self
    where
        F: Fn(TriggerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<ProactiveMessage>>> + Send + 'static,
    {
        Self {
            id: id.into(),
            category,
            guard: None,
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
            cooldown,
        }
    }

    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&TriggerContext) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }
}

impl fmt::Debug for TriggerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDefinition")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("guarded", &self.guard.is_some())
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TriggerRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TriggerRegistry {
    triggers: Vec<TriggerDefinition>,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trigger. Re-registering an id replaces the earlier definition
    /// in place, keeping its evaluation position.
    pub fn register(&mut self, definition: TriggerDefinition) {
        match self.triggers.iter_mut().find(|t| t.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.triggers.push(definition),
        }
    }

    pub fn get(&self, id: &str) -> Option<&TriggerDefinition> {
        self.triggers.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn all(&self) -> &[TriggerDefinition] {
        &self.triggers
    }

    pub fn for_category(
        &self,
        category: TriggerCategory,
    ) -> impl Iterator<Item = &TriggerDefinition> {
        self.triggers.iter().filter(move |t| t.category == category)
    }

    pub fn last_fired(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock_last_fired().get(id).copied()
    }

    fn lock_last_fired(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        // A panic while holding this lock cannot leave the map half-written.
        self.last_fired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn in_cooldown(&self, trigger: &TriggerDefinition, now: DateTime<Utc>) -> bool {
        cooling_down(self.last_fired(&trigger.id), trigger.cooldown, now)
    }

    /// Stamp `last_fired` unless another evaluation already fired this
    /// trigger inside its cooldown. Check and stamp share one critical
    /// section.
    fn try_stamp(&self, trigger: &TriggerDefinition, now: DateTime<Utc>) -> bool {
        let mut last_fired = self.lock_last_fired();
        if cooling_down(last_fired.get(&trigger.id).copied(), trigger.cooldown, now) {
            return false;
        }
        last_fired.insert(trigger.id.clone(), now);
        true
    }

    pub async fn evaluate(
        &self,
        category: TriggerCategory,
        ctx: TriggerContext,
    ) -> Option<ProactiveMessage> {
        self.evaluate_at(category, ctx, Utc::now()).await
    }

    /// Run the first-match algorithm for `category` as of `now`.
    pub async fn evaluate_at(
        &self,
        category: TriggerCategory,
        ctx: TriggerContext,
        now: DateTime<Utc>,
    ) -> Option<ProactiveMessage> {
        for trigger in self.for_category(category) {
            if self.in_cooldown(trigger, now) {
                debug!(trigger = %trigger.id, "trigger in cooldown");
                continue;
            }
            if let Some(guard) = &trigger.guard {
                if !guard(&ctx) {
                    debug!(trigger = %trigger.id, "trigger guard rejected");
                    continue;
                }
            }

            let outcome = AssertUnwindSafe((trigger.handler)(ctx.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(Some(mut message))) => {
                    if !self.try_stamp(trigger, now) {
                        debug!(trigger = %trigger.id, "trigger fired concurrently, message dropped");
                        continue;
                    }
                    message.source.get_or_insert_with(|| trigger.id.clone());
                    info!(
                        trigger = %trigger.id,
                        category = %category,
                        priority = %message.priority,
                        "trigger fired"
                    );
                    return Some(message);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(trigger = %trigger.id, error = %format!("{e:#}"), "trigger handler failed");
                }
                Err(_) => {
                    warn!(trigger = %trigger.id, "trigger handler panicked");
                }
            }
        }
        None
    }

    /// Evaluate every category once, in [`TriggerCategory::all`] order, and
    /// collect each category's message. No merging across categories.
    pub async fn evaluate_all(&self, ctx: TriggerContext) -> Vec<ProactiveMessage> {
        self.evaluate_all_at(ctx, Utc::now()).await
    }

    pub async fn evaluate_all_at(
        &self,
        ctx: TriggerContext,
        now: DateTime<Utc>,
    ) -> Vec<ProactiveMessage> {
        let mut out = Vec::new();
        for category in TriggerCategory::all() {
            if let Some(message) = self.evaluate_at(*category, ctx.clone(), now).await {
                out.push(message);
            }
        }
        out
    }
}

fn cooling_down(last: Option<DateTime<Utc>>, cooldown: Duration, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return false;
    };
    if cooldown.is_zero() {
        return false;
    }
    match (now - last).to_std() {
        Ok(elapsed) => elapsed < cooldown,
        // last-fired later than `now`: treat as still cooling down
        Err(_) => true,
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("triggers", &self.triggers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> TriggerContext {
        TriggerContext::new(Session::new("p1"))
    }

    fn fixed(id: &str, category: TriggerCategory, text: &'static str) -> TriggerDefinition {
        TriggerDefinition::new(id, category, Duration::from_secs(60), move |_| async move {
            Ok(Some(ProactiveMessage::medium(text)))
        })
    }

    #[tokio::test]
    async fn guard_false_falls_through_to_next_trigger() {
        let mut reg = TriggerRegistry::new();
        reg.register(fixed("first", TriggerCategory::ViewChanged, "first").with_guard(|_| false));
        reg.register(fixed("second", TriggerCategory::ViewChanged, "second").with_guard(|_| true));

        let msg = reg.evaluate(TriggerCategory::ViewChanged, ctx()).await.unwrap();
        assert_eq!(msg.text, "second");
        assert_eq!(msg.source.as_deref(), Some("second"));
        assert!(reg.last_fired("first").is_none());
    }

    #[tokio::test]
    async fn evaluation_is_first_match_not_priority() {
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerDefinition::new(
            "low",
            TriggerCategory::Idle,
            Duration::ZERO,
            |_| async { Ok(Some(ProactiveMessage::low("low"))) },
        ));
        reg.register(TriggerDefinition::new(
            "high",
            TriggerCategory::Idle,
            Duration::ZERO,
            |_| async { Ok(Some(ProactiveMessage::high("high"))) },
        ));
        let msg = reg.evaluate(TriggerCategory::Idle, ctx()).await.unwrap();
        assert_eq!(msg.priority, Priority::Low);
    }

    #[tokio::test]
    async fn cooldown_blocks_until_window_elapses() {
        let mut reg = TriggerRegistry::new();
        reg.register(fixed("t", TriggerCategory::Periodic, "tick"));
        let t0 = Utc::now();
        let c = chrono::Duration::seconds(60);

        assert!(reg
            .evaluate_at(TriggerCategory::Periodic, ctx(), t0)
            .await
            .is_some());
        assert_eq!(reg.last_fired("t"), Some(t0));
        assert!(reg
            .evaluate_at(TriggerCategory::Periodic, ctx(), t0 + chrono::Duration::seconds(59))
            .await
            .is_none());
        assert!(reg
            .evaluate_at(TriggerCategory::Periodic, ctx(), t0 + c)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn null_result_does_not_stamp_last_fired() {
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerDefinition::new(
            "quiet",
            TriggerCategory::Idle,
            Duration::from_secs(600),
            |_| async { Ok(None) },
        ));
        assert!(reg.evaluate(TriggerCategory::Idle, ctx()).await.is_none());
        assert!(reg.last_fired("quiet").is_none());
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_do_not_block_siblings() {
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerDefinition::new(
            "broken",
            TriggerCategory::EntitySelected,
            Duration::ZERO,
            |_| async { Err(anyhow::anyhow!("backend unavailable")) },
        ));
        reg.register(TriggerDefinition::new(
            "panics",
            TriggerCategory::EntitySelected,
            Duration::ZERO,
            |_| async {
                let explode = true;
                if explode {
                    panic!("boom");
                }
                Ok(None)
            },
        ));
        reg.register(fixed("ok", TriggerCategory::EntitySelected, "fine"));

        let msg = reg
            .evaluate(TriggerCategory::EntitySelected, ctx())
            .await
            .unwrap();
        assert_eq!(msg.text, "fine");
    }

    #[tokio::test]
    async fn other_categories_are_not_evaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reg = TriggerRegistry::new();
        reg.register(TriggerDefinition::new(
            "idle-only",
            TriggerCategory::Idle,
            Duration::ZERO,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some(ProactiveMessage::low("idle"))) }
            },
        ));
        assert!(reg
            .evaluate(TriggerCategory::ViewChanged, ctx())
            .await
            .is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bulk_collects_one_message_per_category() {
        let mut reg = TriggerRegistry::new();
        reg.register(fixed("v1", TriggerCategory::ViewChanged, "view-1"));
        reg.register(fixed("v2", TriggerCategory::ViewChanged, "view-2"));
        reg.register(fixed("p", TriggerCategory::Periodic, "periodic"));
        reg.register(fixed("x", TriggerCategory::ExternalProcessed, "done"));

        let all = reg.evaluate_all(ctx()).await;
        let texts: Vec<_> = all.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["view-1", "periodic", "done"]);
    }

    #[test]
    fn reregistering_an_id_replaces_in_place() {
        let mut reg = TriggerRegistry::new();
        reg.register(fixed("a", TriggerCategory::Idle, "a"));
        reg.register(fixed("b", TriggerCategory::Idle, "b"));
        reg.register(fixed("a", TriggerCategory::Periodic, "a2"));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.all()[0].id, "a");
        assert_eq!(reg.all()[0].category, TriggerCategory::Periodic);
    }

    #[test]
    fn external_events_map_to_their_categories() {
        let added = ExternalEvent::ItemsAdded {
            kind: "signals".into(),
            count: 3,
        };
        assert_eq!(added.category(), TriggerCategory::ExternalAdded);
        let json = serde_json::to_value(&added).unwrap();
        assert_eq!(json["type"], "items_added");
    }

    fn yielding(id: &str, cooldown: Duration) -> TriggerDefinition {
        TriggerDefinition::new(id, TriggerCategory::ViewChanged, cooldown, |_| async {
            tokio::task::yield_now().await;
            Ok(Some(ProactiveMessage::low("hello")))
        })
    }

    #[tokio::test]
    async fn overlapping_evaluations_fire_once_per_cooldown() {
        let mut reg = TriggerRegistry::new();
        reg.register(yielding("slow", Duration::from_secs(600)));

        let (a, b) = tokio::join!(
            reg.evaluate(TriggerCategory::ViewChanged, ctx()),
            reg.evaluate(TriggerCategory::ViewChanged, ctx()),
        );
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert!(reg.last_fired("slow").is_some());
    }

    #[tokio::test]
    async fn overlapping_evaluations_without_cooldown_both_fire() {
        let mut reg = TriggerRegistry::new();
        reg.register(yielding("eager", Duration::ZERO));

        let (a, b) = tokio::join!(
            reg.evaluate(TriggerCategory::ViewChanged, ctx()),
            reg.evaluate(TriggerCategory::ViewChanged, ctx()),
        );
        assert!(a.is_some() && b.is_some());
    }
}
