//! The orchestrator: owns one [`Session`], applies transitions, and runs the
//! derived effects (trigger evaluation, idle timer, expiry sweep, command
//! and completion paths).
//!
//! The session sits behind a `std::sync::Mutex` that is never held across an
//! await. Every async effect works on a snapshot and applies its outcome to
//! whatever the session looks like when it completes.

use super::state::{EntitySelection, ProjectDataPatch, Session, Transition};
use crate::action::{ActionDescriptor, NavigationTarget};
use crate::backend::{BackendClient, MemoryBackend};
use crate::commands::{self, is_command, CommandRegistry, CommandResult, ParsedCommand};
use crate::config::{EngineConfig, WarnLevel};
use crate::error::{AssistError, Result};
use crate::message::{Message, MessageMetadata, ProactiveMessage};
use crate::triggers::priority::{filter_expired, is_expired_at, sort_by_priority};
use crate::triggers::{self, ExternalEvent, TriggerCategory, TriggerContext, TriggerRegistry};
use crate::types::{Mode, View};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type CompletionFn =
    Arc<dyn Fn(String, Session) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;
pub type RefreshFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<ProjectDataPatch>> + Send + Sync>;

const NO_COMPLETION_REPLY: &str =
    "I can only run commands in this session. Type /help to see what is available.";

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Broadcast to subscribers after the session changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A transition was applied. Carries [`Transition::kind`].
    Changed { transition: &'static str },
    /// A command asked the host to show a view or entity.
    Navigate(NavigationTarget),
}

/// What running a quick action did.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Command(CommandResult),
    Callback(std::result::Result<(), String>),
    Navigated(NavigationTarget),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct AssistantBuilder {
    project_id: String,
    config: EngineConfig,
    commands: Option<CommandRegistry>,
    triggers: Option<TriggerRegistry>,
    backend: Option<Arc<dyn BackendClient>>,
    completion: Option<CompletionFn>,
    refresh: Option<RefreshFn>,
}

impl AssistantBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in command set.
    pub fn commands(mut self, registry: CommandRegistry) -> Self {
        self.commands = Some(registry);
        self
    }

    /// Replace the built-in trigger set.
    pub fn triggers(mut self, registry: TriggerRegistry) -> Self {
        self.triggers = Some(registry);
        self
    }

    /// Backend used by the built-in commands. Defaults to [`MemoryBackend`].
    pub fn backend(mut self, backend: Arc<dyn BackendClient>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn completion<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.completion = Some(Arc::new(move |text, snapshot| f(text, snapshot).boxed()));
        self
    }

    /// Called with the project id after a command listed in
    /// `refresh_after` succeeds. The returned patch is merged into the
    /// session's project data.
    pub fn refresh<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProjectDataPatch>> + Send + 'static,
    {
        self.refresh = Some(Arc::new(move |project| f(project).boxed()));
        self
    }

    /// Build the assistant. Inside a Tokio runtime this also starts the idle
    /// timer and the expiry sweep.
    pub fn build(self) -> Assistant {
        let commands = self.commands.unwrap_or_else(|| {
            let backend = self
                .backend
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
            let mut registry =
                CommandRegistry::new().with_max_suggestions(self.config.max_suggestions);
            commands::builtin::register_defaults(&mut registry, backend);
            registry
        });
        let triggers = self.triggers.unwrap_or_else(|| {
            let mut registry = TriggerRegistry::new();
            triggers::builtin::register_defaults(&mut registry, &self.config);
            registry
        });
        for issue in self.config.validate() {
            if issue.level == WarnLevel::Error {
                warn!(issue = %issue.message, "engine config out of range, timers clamped");
            }
        }
        let (events, _) = broadcast::channel(64);

        let inner = Arc::new(Inner {
            session: Mutex::new(Session::new(self.project_id)),
            commands: Arc::new(commands),
            triggers: Arc::new(triggers),
            config: self.config,
            completion: self.completion,
            refresh: self.refresh,
            events,
            activity: Notify::new(),
        });

        let mut tasks = Vec::new();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tasks.push(handle.spawn(idle_loop(inner.clone())));
            tasks.push(handle.spawn(sweep_loop(inner.clone())));
        }
        Assistant {
            inner,
            tasks: Mutex::new(tasks),
        }
    }
}

// ---------------------------------------------------------------------------
// Inner: state shared with background tasks
// ---------------------------------------------------------------------------

struct Inner {
    session: Mutex<Session>,
    commands: Arc<CommandRegistry>,
    triggers: Arc<TriggerRegistry>,
    config: EngineConfig,
    completion: Option<CompletionFn>,
    refresh: Option<RefreshFn>,
    events: broadcast::Sender<SessionEvent>,
    /// Signalled by every session-mutating call; restarts the idle timer.
    activity: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        // Session::apply either completes or returns before mutating.
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    fn apply(&self, transition: Transition) -> Result<()> {
        let kind = transition.kind();
        self.lock().apply(transition)?;
        self.applied(kind);
        Ok(())
    }

    fn applied(&self, kind: &'static str) {
        debug!(transition = kind, "session transition applied");
        // no subscribers is fine
        let _ = self.events.send(SessionEvent::Changed { transition: kind });
    }

    /// Apply a transition that cannot fail.
    fn commit(&self, transition: Transition) {
        if let Err(e) = self.apply(transition) {
            warn!(error = %e, "session transition rejected");
        }
    }

    fn touch(&self) {
        self.activity.notify_one();
    }

    async fn run_category(&self, category: TriggerCategory, event: Option<ExternalEvent>) {
        let snapshot = self.snapshot();
        let ctx = match event {
            Some(event) => TriggerContext::with_event(snapshot, event),
            None => TriggerContext::new(snapshot),
        };
        if let Some(message) = self.triggers.evaluate(category, ctx).await {
            self.commit(Transition::AppendProactive(message));
        }
    }

    // -- command path -------------------------------------------------------

    async fn run_parsed(self: &Arc<Self>, parsed: ParsedCommand) -> CommandResult {
        let name = parsed.name.clone();
        let snapshot = self.snapshot();
        let mode = snapshot.mode();
        let result = self.commands.execute(parsed, snapshot).await;
        self.fold_result(&name, mode, &result).await;
        result
    }

    async fn run_input(self: &Arc<Self>, input: &str) -> CommandResult {
        match self.commands.parse(input) {
            Ok(parsed) => self.run_parsed(parsed).await,
            Err(e) => {
                let result = CommandResult::failure(format!("{e}. Type /help to see all commands."));
                let mode = self.lock().mode();
                self.fold_result("", mode, &result).await;
                result
            }
        }
    }

    /// Fold a command result back into the session: reply message,
    /// navigation, actions, then the project data refresh.
    async fn fold_result(self: &Arc<Self>, command: &str, mode: Mode, result: &CommandResult) {
        let metadata = MessageMetadata {
            command: (!command.is_empty()).then(|| command.to_string()),
            mode: Some(mode),
            success: Some(result.success),
        };
        self.commit(Transition::AppendMessage(
            Message::assistant(result.message.clone()).with_metadata(metadata),
        ));

        if let Some(target) = &result.navigate_to {
            self.navigate(target.clone());
        }
        if !result.actions.is_empty() {
            self.commit(Transition::ReplaceSuggestedActions(result.actions.clone()));
        }

        if result.success && self.config.refreshes_after(command) {
            if let Some(refresh) = &self.refresh {
                let project = self.lock().project_id.clone();
                match AssertUnwindSafe(refresh(project)).catch_unwind().await {
                    Ok(Ok(patch)) => self.commit(Transition::MergeProjectData(patch)),
                    Ok(Err(e)) => {
                        warn!(command, error = %format!("{e:#}"), "project data refresh failed")
                    }
                    Err(_) => warn!(command, "project data refresh panicked"),
                }
            }
        }
    }

    fn navigate(self: &Arc<Self>, target: NavigationTarget) {
        let current = self.lock().active_view.clone();
        if current != target.view {
            self.set_view(target.view.clone());
        }
        let _ = self.events.send(SessionEvent::Navigate(target));
    }

    fn set_view(self: &Arc<Self>, view: View) -> Option<JoinHandle<()>> {
        info!(view = %view, "active view changed");
        self.commit(Transition::SetView(view));
        self.spawn_category(TriggerCategory::ViewChanged, None)
    }

    fn spawn_category(
        self: &Arc<Self>,
        category: TriggerCategory,
        event: Option<ExternalEvent>,
    ) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let inner = self.clone();
        Some(handle.spawn(async move { inner.run_category(category, event).await }))
    }

    // -- completion path ----------------------------------------------------

    async fn complete(&self, text: String) {
        let snapshot = self.snapshot();
        let mode = snapshot.mode();
        let Some(completion) = &self.completion else {
            self.commit(Transition::AppendMessage(Message::assistant(NO_COMPLETION_REPLY)));
            return;
        };

        let outcome = AssertUnwindSafe(completion(text, snapshot))
            .catch_unwind()
            .await;
        let (content, success) = match outcome {
            Ok(Ok(reply)) => (reply, true),
            Ok(Err(e)) => {
                let err = AssistError::ExternalService(format!("{e:#}"));
                warn!(error = %err, "completion failed");
                (format!("Sorry, I could not get an answer: {err}"), false)
            }
            Err(_) => {
                warn!("completion panicked");
                (
                    "Sorry, I could not get an answer: the completion service crashed".to_string(),
                    false,
                )
            }
        };
        self.commit(Transition::AppendMessage(
            Message::assistant(content).with_metadata(MessageMetadata {
                command: None,
                mode: Some(mode),
                success: Some(success),
            }),
        ));
    }
}

/// Sets the loading flag for its lifetime. Dropping it clears the flag even
/// when the owning future is cancelled.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> LoadingGuard<'a> {
    fn start(inner: &'a Inner) -> Self {
        inner.commit(Transition::SetLoading(true));
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.commit(Transition::SetLoading(false));
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

async fn idle_loop(inner: Arc<Inner>) {
    let threshold = inner.config.idle_threshold();
    loop {
        tokio::select! {
            _ = inner.activity.notified() => continue,
            _ = tokio::time::sleep(threshold) => {
                debug!(threshold_secs = threshold.as_secs(), "session idle");
                inner.run_category(TriggerCategory::Idle, None).await;
            }
        }
    }
}

async fn sweep_loop(inner: Arc<Inner>) {
    let mut interval = tokio::time::interval(inner.config.sweep_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let expired = {
            let session = inner.lock();
            let now = Utc::now();
            session
                .pending_proactive_messages
                .iter()
                .any(|m| is_expired_at(m, now))
        };
        if expired {
            inner.commit(Transition::PruneExpired { now: Utc::now() });
        }
        inner.run_category(TriggerCategory::Periodic, None).await;
    }
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

/// Owns a single session. Dropping it (or calling [`Assistant::shutdown`])
/// stops the idle timer and the sweep; trigger evaluations already in
/// flight still complete.
pub struct Assistant {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Assistant {
    pub fn builder(project_id: impl Into<String>) -> AssistantBuilder {
        AssistantBuilder {
            project_id: project_id.into(),
            config: EngineConfig::default(),
            commands: None,
            triggers: None,
            backend: None,
            completion: None,
            refresh: None,
        }
    }

    pub fn session(&self) -> Session {
        self.inner.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // -- host events --------------------------------------------------------

    /// Switch views and evaluate view-changed triggers in the background.
    /// The handle resolves once the evaluation has been applied.
    pub fn set_active_view(&self, view: View) -> Option<JoinHandle<()>> {
        self.inner.touch();
        self.inner.set_view(view)
    }

    /// Override the derived mode until the next view change.
    pub fn set_mode(&self, mode: Mode) {
        self.inner.touch();
        self.inner.commit(Transition::SetMode(mode));
    }

    /// Select (or clear, with `None`) an entity. A selection evaluates
    /// entity-selected triggers in the background.
    pub fn select_entity(&self, selection: Option<EntitySelection>) -> Option<JoinHandle<()>> {
        self.inner.touch();
        let selected = selection.is_some();
        self.inner.commit(Transition::SelectEntity(selection));
        if !selected {
            return None;
        }
        self.inner
            .spawn_category(TriggerCategory::EntitySelected, None)
    }

    pub fn merge_project_data(&self, patch: ProjectDataPatch) {
        self.inner.touch();
        self.inner.commit(Transition::MergeProjectData(patch));
    }

    /// Report background activity. Evaluates the matching external category.
    pub fn notify_external(&self, event: ExternalEvent) -> Option<JoinHandle<()>> {
        let category = event.category();
        self.inner.spawn_category(category, Some(event))
    }

    /// Evaluate every category once and enqueue every result. Returns how
    /// many messages were added.
    pub async fn evaluate_all_triggers(&self) -> usize {
        let ctx = TriggerContext::new(self.inner.snapshot());
        let messages = self.inner.triggers.evaluate_all(ctx).await;
        let count = messages.len();
        for message in messages {
            self.inner.commit(Transition::AppendProactive(message));
        }
        count
    }

    // -- chat ---------------------------------------------------------------

    /// Handle one line of user input. Slash commands run through the command
    /// registry; anything else goes to the completion service. Returns the
    /// assistant reply, or `None` for blank input.
    pub async fn send_message(&self, text: &str) -> Option<Message> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.inner.touch();
        self.inner
            .commit(Transition::AppendMessage(Message::user(text)));

        {
            let _loading = LoadingGuard::start(&self.inner);
            if is_command(text) {
                self.inner.run_input(text).await;
            } else {
                self.inner.complete(text.to_string()).await;
            }
        }
        self.inner.touch();
        self.inner.snapshot().last_message().cloned()
    }

    pub fn clear_messages(&self) {
        self.inner.touch();
        self.inner.commit(Transition::ClearMessages);
    }

    /// Run a command by name with already-split arguments, folding its
    /// result into the session without a user message.
    pub async fn execute_command(&self, name: &str, args: Vec<String>) -> CommandResult {
        self.inner.touch();
        let _loading = LoadingGuard::start(&self.inner);
        match self.inner.commands.parse_parts(name, args) {
            Ok(parsed) => self.inner.run_parsed(parsed).await,
            Err(e) => {
                let result = CommandResult::failure(format!("{e}. Type /help to see all commands."));
                let mode = self.inner.lock().mode();
                self.inner.fold_result(name, mode, &result).await;
                result
            }
        }
    }

    // -- actions ------------------------------------------------------------

    pub fn suggested_actions(&self) -> Vec<ActionDescriptor> {
        self.inner.lock().suggested_actions.clone()
    }

    /// Suggested actions first, then proactive actions from the newest
    /// pending message back, so a fresh nudge shadows an older one.
    fn find_action(&self, id: &str) -> Option<ActionDescriptor> {
        let session = self.inner.lock();
        session
            .suggested_actions
            .iter()
            .chain(
                session
                    .pending_proactive_messages
                    .iter()
                    .rev()
                    .flat_map(|m| m.actions.iter()),
            )
            .find(|a| a.id == id)
            .cloned()
    }

    /// Run the suggested or proactive action `id`. A direct callback takes
    /// precedence over a command string, which takes precedence over
    /// navigation.
    pub async fn execute_quick_action(&self, id: &str) -> Result<ActionOutcome> {
        let action = self
            .find_action(id)
            .ok_or_else(|| AssistError::UnknownAction(id.to_string()))?;
        self.inner.touch();
        info!(action = %action.id, "quick action");

        if let Some(callback) = &action.callback {
            let outcome = match AssertUnwindSafe(callback.invoke()).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(_) => Err(format!("action {} panicked", action.id)),
            };
            if let Err(message) = &outcome {
                warn!(action = %action.id, error = %message, "quick action callback failed");
                let mode = self.inner.lock().mode();
                self.inner.commit(Transition::AppendMessage(
                    Message::assistant(format!("{} failed: {message}", action.label))
                        .with_metadata(MessageMetadata {
                            command: None,
                            mode: Some(mode),
                            success: Some(false),
                        }),
                ));
            }
            return Ok(ActionOutcome::Callback(outcome));
        }
        if let Some(command) = &action.command {
            let _loading = LoadingGuard::start(&self.inner);
            return Ok(ActionOutcome::Command(self.inner.run_input(command).await));
        }
        if let Some(target) = &action.navigate {
            self.inner.navigate(target.clone());
            return Ok(ActionOutcome::Navigated(target.clone()));
        }
        Err(AssistError::UnknownAction(id.to_string()))
    }

    // -- proactive queue ----------------------------------------------------

    /// Remove the pending message at queue position `index`.
    pub fn dismiss_proactive_message(&self, index: usize) -> Result<()> {
        self.inner.lock().dismiss_proactive(index)?;
        self.inner.touch();
        self.inner.applied(Transition::RemoveProactive(index).kind());
        Ok(())
    }

    /// Unexpired pending messages, highest priority first. Equal priorities
    /// keep queue order.
    pub fn visible_proactive_messages(&self) -> Vec<ProactiveMessage> {
        let pending = self.inner.lock().pending_proactive_messages.clone();
        sort_by_priority(filter_expired(pending))
    }

    pub fn top_proactive_message(&self) -> Option<ProactiveMessage> {
        self.visible_proactive_messages().into_iter().next()
    }

    /// Stop the idle timer and the expiry sweep.
    pub fn shutdown(&self) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.shutdown();
    }
}
