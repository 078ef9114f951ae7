//! Stock proactive triggers. Registration order is evaluation order within
//! each category.

use super::registry::{
    ExternalEvent, TriggerCategory, TriggerContext, TriggerDefinition, TriggerRegistry,
};
use crate::action::ActionDescriptor;
use crate::config::EngineConfig;
use crate::message::ProactiveMessage;
use crate::mode::profile;
use crate::types::{ActionVariant, Mode};
use std::time::Duration;

// Proactive action ids are distinct from the suggested-action ids in
// `mode.rs`, so both stay reachable through `execute_quick_action`.
pub const NUDGE_VIEW_BLOCKERS_ID: &str = "nudge-view-blockers";
pub const NUDGE_ANALYZE_ID: &str = "nudge-analyze";
pub const NUDGE_CONFIRM_ID: &str = "nudge-confirm";
pub const NUDGE_REVIEW_ID: &str = "nudge-review";
pub const NUDGE_STATUS_ID: &str = "nudge-status";
pub const NUDGE_FOUNDATION_ID: &str = "nudge-run-foundation";

const NEEDS_REVIEW_STATUSES: &[&str] = &["draft", "needs_review", "ai_generated"];

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

fn review_action(label: String) -> ActionDescriptor {
    ActionDescriptor::command(NUDGE_REVIEW_ID, label, "/review").with_variant(ActionVariant::Warning)
}

pub fn register_defaults(registry: &mut TriggerRegistry, config: &EngineConfig) {
    let ttl = config.proactive_ttl();
    let threshold = config.readiness_warning_threshold;

    // -- view changed -------------------------------------------------------

    registry.register(
        TriggerDefinition::new(
            "blockers-on-arrival",
            TriggerCategory::ViewChanged,
            minutes(5),
            move |ctx: TriggerContext| async move {
                let blockers = &ctx.session.project_data.blockers;
                let text = match blockers.as_slice() {
                    [only] => format!("One thing is blocking this project: {only}"),
                    [first, rest @ ..] => {
                        format!("{} blockers need attention, starting with: {first}", rest.len() + 1)
                    }
                    [] => return Ok(None),
                };
                Ok(Some(
                    ProactiveMessage::high(text)
                        .with_action(
                            ActionDescriptor::command(NUDGE_VIEW_BLOCKERS_ID, "View Blockers", "/blockers")
                                .with_variant(ActionVariant::Danger),
                        )
                        .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| !ctx.session.project_data.blockers.is_empty()),
    );

    registry.register(
        TriggerDefinition::new(
            "mode-intro",
            TriggerCategory::ViewChanged,
            minutes(10),
            move |ctx: TriggerContext| async move {
                let mode = ctx.session.mode();
                let commands: Vec<String> = profile(mode)
                    .suggested_commands
                    .iter()
                    .map(|c| format!("/{c}"))
                    .collect();
                Ok(Some(
                    ProactiveMessage::low(format!(
                        "Switched to {mode} mode. Useful here: {}.",
                        commands.join(", ")
                    ))
                    .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| ctx.session.mode() != Mode::General),
    );

    // -- entity selected ----------------------------------------------------

    registry.register(
        TriggerDefinition::new(
            "selected-needs-review",
            TriggerCategory::EntitySelected,
            Duration::from_secs(30),
            move |ctx: TriggerContext| async move {
                let Some(sel) = ctx.session.selected_entity else {
                    return Ok(None);
                };
                let target = format!("{}/{}", sel.entity_type.collection(), sel.id);
                Ok(Some(
                    ProactiveMessage::medium(format!(
                        "This {} is still {}. Check it before it goes to the client.",
                        sel.entity_type,
                        sel.status.replace('_', " ")
                    ))
                    .with_action(
                        ActionDescriptor::command(
                            NUDGE_ANALYZE_ID,
                            "Analyze",
                            format!("/analyze {target}"),
                        )
                        .with_variant(ActionVariant::Primary),
                    )
                    .with_action(ActionDescriptor::command(
                        NUDGE_CONFIRM_ID,
                        "Confirm",
                        format!("/confirm {target}"),
                    ))
                    .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| {
            ctx.session.selected_entity.as_ref().is_some_and(|sel| {
                NEEDS_REVIEW_STATUSES.contains(&sel.status.to_ascii_lowercase().as_str())
            })
        }),
    );

    registry.register(TriggerDefinition::new(
        "selected-default",
        TriggerCategory::EntitySelected,
        Duration::from_secs(30),
        move |ctx: TriggerContext| async move {
            let Some(sel) = ctx.session.selected_entity else {
                return Ok(None);
            };
            Ok(Some(
                ProactiveMessage::low(format!("Want me to take a look at this {}?", sel.entity_type))
                    .with_action(ActionDescriptor::command(
                        NUDGE_ANALYZE_ID,
                        "Analyze",
                        format!("/analyze {}/{}", sel.entity_type.collection(), sel.id),
                    ))
                    .expires_in(ttl),
            ))
        },
    ));

    // -- idle ---------------------------------------------------------------

    registry.register(
        TriggerDefinition::new(
            "idle-pending-confirmations",
            TriggerCategory::Idle,
            minutes(10),
            move |ctx: TriggerContext| async move {
                let n = ctx.session.project_data.pending_confirmations;
                let noun = if n == 1 { "item is" } else { "items are" };
                Ok(Some(
                    ProactiveMessage::medium(format!("{n} {noun} waiting for your confirmation."))
                        .with_action(review_action(format!("Review {n} Pending")))
                        .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| ctx.session.project_data.pending_confirmations > 0),
    );

    registry.register(
        TriggerDefinition::new(
            "idle-low-readiness",
            TriggerCategory::Idle,
            minutes(15),
            move |ctx: TriggerContext| async move {
                let Some(score) = ctx.session.project_data.readiness_score else {
                    return Ok(None);
                };
                Ok(Some(
                    ProactiveMessage::low(format!(
                        "Readiness is at {score}%. /status shows what is missing."
                    ))
                    .with_action(ActionDescriptor::command(
                        NUDGE_STATUS_ID,
                        "Project Status",
                        "/status",
                    ))
                    .expires_in(ttl),
                ))
            },
        )
        .with_guard(move |ctx| {
            ctx.session
                .project_data
                .readiness_score
                .is_some_and(|s| s < threshold)
        }),
    );

    // -- periodic -----------------------------------------------------------

    registry.register(
        TriggerDefinition::new(
            "readiness-drop",
            TriggerCategory::Periodic,
            minutes(15),
            move |ctx: TriggerContext| async move {
                let warnings = &ctx.session.project_data.warnings;
                let Some(first) = warnings.first() else {
                    return Ok(None);
                };
                let text = if warnings.len() == 1 {
                    format!("Heads up: {first}")
                } else {
                    format!("{} warnings on this project. First: {first}", warnings.len())
                };
                Ok(Some(ProactiveMessage::low(text).expires_in(ttl)))
            },
        )
        .with_guard(|ctx| !ctx.session.project_data.warnings.is_empty()),
    );

    // -- external -----------------------------------------------------------

    registry.register(
        TriggerDefinition::new(
            "signals-added",
            TriggerCategory::ExternalAdded,
            Duration::ZERO,
            move |ctx: TriggerContext| async move {
                let Some(ExternalEvent::ItemsAdded { kind, count }) = ctx.event else {
                    return Ok(None);
                };
                if count == 0 {
                    return Ok(None);
                }
                Ok(Some(
                    ProactiveMessage::medium(format!(
                        "{count} new {kind} came in. I can fold them into the analysis."
                    ))
                    .with_action(ActionDescriptor::command(
                        NUDGE_FOUNDATION_ID,
                        "Re-run Foundation",
                        "/run-foundation",
                    ))
                    .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| ctx.event.is_some()),
    );

    registry.register(
        TriggerDefinition::new(
            "processing-complete",
            TriggerCategory::ExternalProcessed,
            Duration::ZERO,
            move |ctx: TriggerContext| async move {
                let Some(ExternalEvent::ProcessingComplete {
                    kind,
                    succeeded,
                    failed,
                }) = ctx.event
                else {
                    return Ok(None);
                };
                let text = if failed == 0 {
                    format!("{kind} finished: {succeeded} processed. Results are ready to review.")
                } else {
                    format!(
                        "{kind} finished: {succeeded} processed, {failed} failed. \
                         Review the results."
                    )
                };
                Ok(Some(
                    ProactiveMessage::high(text)
                        .with_action(review_action("Review Results".to_string()))
                        .expires_in(ttl),
                ))
            },
        )
        .with_guard(|ctx| ctx.event.is_some()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EntitySelection, ProjectDataPatch, Session, Transition};
    use crate::types::{EntityType, Priority, View};

    fn registry() -> TriggerRegistry {
        let mut reg = TriggerRegistry::new();
        register_defaults(&mut reg, &EngineConfig::default());
        reg
    }

    fn session_with(patch: ProjectDataPatch) -> Session {
        let mut s = Session::new("p1");
        s.apply(Transition::MergeProjectData(patch)).unwrap();
        s
    }

    #[test]
    fn registration_order_per_category() {
        let reg = registry();
        let ids: Vec<_> = reg
            .for_category(TriggerCategory::ViewChanged)
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["blockers-on-arrival", "mode-intro"]);
        assert_eq!(reg.len(), 9);
    }

    #[tokio::test]
    async fn blockers_outrank_mode_intro_on_arrival() {
        let reg = registry();
        let mut s = session_with(ProjectDataPatch {
            blockers: Some(vec!["No sponsor".into(), "No budget".into()]),
            ..Default::default()
        });
        s.apply(Transition::SetView(View::Personas)).unwrap();
        let msg = reg
            .evaluate(TriggerCategory::ViewChanged, TriggerContext::new(s.clone()))
            .await
            .unwrap();
        assert_eq!(msg.source.as_deref(), Some("blockers-on-arrival"));
        assert_eq!(msg.priority, Priority::High);
        assert!(msg.text.starts_with("2 blockers"));

        // blockers trigger now cooling down, so the mode intro gets a turn
        let next = reg
            .evaluate(TriggerCategory::ViewChanged, TriggerContext::new(s))
            .await
            .unwrap();
        assert_eq!(next.source.as_deref(), Some("mode-intro"));
        assert!(next.text.contains("/create-persona"));
    }

    #[tokio::test]
    async fn general_mode_gets_no_intro() {
        let reg = registry();
        let mut s = Session::new("p1");
        s.apply(Transition::SetView(View::parse("settings"))).unwrap();
        assert!(reg
            .evaluate(TriggerCategory::ViewChanged, TriggerContext::new(s))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn draft_selection_asks_for_review() {
        let reg = registry();
        let mut s = Session::new("p1");
        s.apply(Transition::SelectEntity(Some(EntitySelection::new(
            "f-9",
            EntityType::Feature,
            "ai_generated",
        ))))
        .unwrap();
        let msg = reg
            .evaluate(TriggerCategory::EntitySelected, TriggerContext::new(s))
            .await
            .unwrap();
        assert_eq!(msg.source.as_deref(), Some("selected-needs-review"));
        assert_eq!(msg.actions.len(), 2);
        assert_eq!(msg.actions[1].command.as_deref(), Some("/confirm features/f-9"));
        assert!(msg.expires_at.is_some());
    }

    #[tokio::test]
    async fn confirmed_selection_falls_through_to_default() {
        let reg = registry();
        let mut s = Session::new("p1");
        s.apply(Transition::SelectEntity(Some(EntitySelection::new(
            "s-1",
            EntityType::Stakeholder,
            "confirmed",
        ))))
        .unwrap();
        let msg = reg
            .evaluate(TriggerCategory::EntitySelected, TriggerContext::new(s))
            .await
            .unwrap();
        assert_eq!(msg.source.as_deref(), Some("selected-default"));
        assert_eq!(msg.priority, Priority::Low);
    }

    #[tokio::test]
    async fn idle_prefers_pending_confirmations_then_readiness() {
        let reg = registry();
        let pending = session_with(ProjectDataPatch {
            pending_confirmations: Some(4),
            readiness_score: Some(20),
            ..Default::default()
        });
        let msg = reg
            .evaluate(TriggerCategory::Idle, TriggerContext::new(pending))
            .await
            .unwrap();
        assert_eq!(msg.source.as_deref(), Some("idle-pending-confirmations"));
        assert_eq!(msg.actions[0].label, "Review 4 Pending");

        let low = session_with(ProjectDataPatch {
            readiness_score: Some(20),
            ..Default::default()
        });
        let msg = reg
            .evaluate(TriggerCategory::Idle, TriggerContext::new(low))
            .await
            .unwrap();
        assert_eq!(msg.source.as_deref(), Some("idle-low-readiness"));

        let healthy = session_with(ProjectDataPatch {
            readiness_score: Some(90),
            ..Default::default()
        });
        let fresh = registry();
        assert!(fresh
            .evaluate(TriggerCategory::Idle, TriggerContext::new(healthy))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn external_events_fill_in_the_message() {
        let reg = registry();
        let added = ExternalEvent::ItemsAdded {
            kind: "signals".into(),
            count: 12,
        };
        let msg = reg
            .evaluate(
                TriggerCategory::ExternalAdded,
                TriggerContext::with_event(Session::new("p1"), added),
            )
            .await
            .unwrap();
        assert_eq!(msg.text, "12 new signals came in. I can fold them into the analysis.");

        let done = ExternalEvent::ProcessingComplete {
            kind: "Signal processing".into(),
            succeeded: 10,
            failed: 2,
        };
        let msg = reg
            .evaluate(
                TriggerCategory::ExternalProcessed,
                TriggerContext::with_event(Session::new("p1"), done),
            )
            .await
            .unwrap();
        assert_eq!(msg.priority, Priority::High);
        assert!(msg.text.contains("2 failed"));

        assert!(reg
            .evaluate(
                TriggerCategory::ExternalProcessed,
                TriggerContext::new(Session::new("p1"))
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn periodic_reports_warnings() {
        let reg = registry();
        let s = session_with(ProjectDataPatch {
            warnings: Some(vec!["Persona Ana has no evidence".into()]),
            ..Default::default()
        });
        let msg = reg
            .evaluate(TriggerCategory::Periodic, TriggerContext::new(s))
            .await
            .unwrap();
        assert_eq!(msg.text, "Heads up: Persona Ana has no evidence");
    }
}
