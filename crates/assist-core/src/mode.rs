//! Mode resolution: view → mode → behavior profile, plus the contextual
//! action set shown next to the chat.
//!
//! Both tables are total. Unmapped views land on [`Mode::General`], and
//! every mode has a profile.
//!
//! The order of [`contextual_actions`] is observable in the UI: base actions
//! come first in profile order, followed by synthesized actions in the fixed
//! order analyze → review → blockers. When ids collide the first occurrence
//! wins, so a base action always beats a synthesized one.

use crate::action::{ActionDescriptor, NavigationTarget};
use crate::types::{ActionVariant, Mode, View};
use std::collections::HashSet;

pub const ANALYZE_SELECTED_ID: &str = "analyze-selected";
pub const REVIEW_PENDING_ID: &str = "review-pending";
pub const VIEW_BLOCKERS_ID: &str = "view-blockers";

// ---------------------------------------------------------------------------
// View → Mode
// ---------------------------------------------------------------------------

pub fn mode_for_view(view: &View) -> Mode {
    match view {
        View::Overview => Mode::Overview,
        View::Foundation | View::Research => Mode::Foundation,
        View::Personas => Mode::Personas,
        View::Features | View::ValuePath => Mode::Features,
        View::BusinessDrivers => Mode::Strategy,
        View::Stakeholders => Mode::Stakeholders,
        View::Review => Mode::Review,
        View::ClientPortal => Mode::Portal,
        View::Other(_) => Mode::General,
    }
}

// ---------------------------------------------------------------------------
// Mode → Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModeProfile {
    pub mode: Mode,
    /// System prompt handed to the completion service while in this mode.
    pub prompt: &'static str,
    pub actions: Vec<ActionDescriptor>,
    pub suggested_commands: &'static [&'static str],
}

pub fn profile(mode: Mode) -> ModeProfile {
    match mode {
        Mode::General => ModeProfile {
            mode,
            prompt: "You are a project assistant. Answer questions about the project \
                     and point the user at the right section of the workbench.",
            actions: vec![
                ActionDescriptor::command("show-help", "Show Commands", "/help"),
                ActionDescriptor::command("project-status", "Project Status", "/status"),
            ],
            suggested_commands: &["help", "status", "goto"],
        },
        Mode::Overview => ModeProfile {
            mode,
            prompt: "You are reviewing overall project health. Summarize readiness, \
                     call out blockers first, and recommend the next most valuable step.",
            actions: vec![
                ActionDescriptor::command("project-status", "Project Status", "/status")
                    .with_variant(ActionVariant::Primary),
                ActionDescriptor::command("run-foundation", "Run Foundation", "/run-foundation"),
            ],
            suggested_commands: &["status", "blockers", "run-foundation"],
        },
        Mode::Foundation => ModeProfile {
            mode,
            prompt: "You help build the project foundation: problem statement, \
                     goals and research. Ask for missing inputs before generating.",
            actions: vec![
                ActionDescriptor::command("run-foundation", "Run Foundation", "/run-foundation")
                    .with_variant(ActionVariant::Primary),
                ActionDescriptor::navigation(
                    "open-research",
                    "Open Research",
                    NavigationTarget::view(View::Research),
                ),
            ],
            suggested_commands: &["run-foundation", "status"],
        },
        Mode::Personas => ModeProfile {
            mode,
            prompt: "You help refine user personas: goals, pain points and the \
                     evidence behind them. Flag personas that lack confirmation.",
            actions: vec![
                ActionDescriptor::command("analyze-persona", "Analyze Persona", "/analyze")
                    .with_variant(ActionVariant::Primary),
                ActionDescriptor::command("review-personas", "Review Personas", "/review"),
            ],
            suggested_commands: &["analyze", "create-persona", "review"],
        },
        Mode::Features => ModeProfile {
            mode,
            prompt: "You help shape product features and the value path. Tie every \
                     feature back to a persona need or business driver.",
            actions: vec![
                ActionDescriptor::command("feature-status", "Feature Status", "/status"),
                ActionDescriptor::command(
                    "new-feature",
                    "New Feature",
                    "/help create-feature",
                ),
            ],
            suggested_commands: &["create-feature", "update-status", "analyze"],
        },
        Mode::Strategy => ModeProfile {
            mode,
            prompt: "You help articulate business drivers: pains, goals and KPIs. \
                     Push for measurable outcomes.",
            actions: vec![
                ActionDescriptor::command("analyze-driver", "Analyze Driver", "/analyze")
                    .with_variant(ActionVariant::Primary),
                ActionDescriptor::command(VIEW_BLOCKERS_ID, "Strategy Blockers", "/blockers"),
            ],
            suggested_commands: &["analyze", "blockers"],
        },
        Mode::Stakeholders => ModeProfile {
            mode,
            prompt: "You help map stakeholders: their role, influence and what they \
                     need to sign off on.",
            actions: vec![
                ActionDescriptor::command(
                    "new-stakeholder",
                    "Add Stakeholder",
                    "/help create-stakeholder",
                ),
                ActionDescriptor::command("stakeholder-review", "Review Pending", "/review"),
            ],
            suggested_commands: &["create-stakeholder", "review"],
        },
        Mode::Review => ModeProfile {
            mode,
            prompt: "You walk the user through items awaiting confirmation, one at a \
                     time, and record their decision.",
            actions: vec![
                ActionDescriptor::command(REVIEW_PENDING_ID, "Review Pending", "/review")
                    .with_variant(ActionVariant::Primary),
                ActionDescriptor::command("project-status", "Project Status", "/status"),
            ],
            suggested_commands: &["review", "confirm", "status"],
        },
        Mode::Portal => ModeProfile {
            mode,
            prompt: "You prepare what the client sees in their portal. Keep language \
                     client-facing and avoid internal notes.",
            actions: vec![
                ActionDescriptor::command("portal-status", "Portal Status", "/status"),
                ActionDescriptor::navigation(
                    "open-overview",
                    "Back to Overview",
                    NavigationTarget::view(View::Overview),
                ),
            ],
            suggested_commands: &["status", "review"],
        },
    }
}

// ---------------------------------------------------------------------------
// Contextual actions
// ---------------------------------------------------------------------------

/// Session facts that add actions on top of a mode's base set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextFlags {
    pub has_selection: bool,
    pub pending_confirmations: u32,
    pub blocker_count: usize,
}

pub fn contextual_actions(mode: Mode, flags: &ContextFlags) -> Vec<ActionDescriptor> {
    let base = profile(mode).actions;
    let mut synthesized = Vec::new();

    if flags.has_selection && !base.iter().any(|a| a.targets_command("analyze")) {
        synthesized.push(
            ActionDescriptor::command(ANALYZE_SELECTED_ID, "Analyze Selected", "/analyze")
                .with_variant(ActionVariant::Primary),
        );
    }
    if flags.pending_confirmations > 0 && !base.iter().any(|a| a.targets_command("review")) {
        synthesized.push(
            ActionDescriptor::command(
                REVIEW_PENDING_ID,
                format!("Review {} Pending", flags.pending_confirmations),
                "/review",
            )
            .with_variant(ActionVariant::Warning),
        );
    }
    if flags.blocker_count > 0 {
        synthesized.push(
            ActionDescriptor::command(
                VIEW_BLOCKERS_ID,
                format!("View Blockers ({})", flags.blocker_count),
                "/blockers",
            )
            .with_variant(ActionVariant::Danger),
        );
    }

    let mut seen = HashSet::new();
    base.into_iter()
        .chain(synthesized)
        .filter(|a| seen.insert(a.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(actions: &[ActionDescriptor]) -> Vec<&str> {
        actions.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn unmapped_views_resolve_to_general() {
        assert_eq!(mode_for_view(&View::Other("settings".into())), Mode::General);
        assert_eq!(mode_for_view(&View::ValuePath), Mode::Features);
        assert_eq!(mode_for_view(&View::Research), Mode::Foundation);
    }

    #[test]
    fn every_mode_has_a_profile_with_actions() {
        for mode in Mode::all() {
            let p = profile(*mode);
            assert_eq!(p.mode, *mode);
            assert!(!p.prompt.is_empty());
            assert!(!p.actions.is_empty());
            assert!(!p.suggested_commands.is_empty());
        }
    }

    #[test]
    fn no_duplicate_analyze_when_base_already_analyzes() {
        let flags = ContextFlags {
            has_selection: true,
            ..Default::default()
        };
        let actions = contextual_actions(Mode::Personas, &flags);
        assert!(!ids(&actions).contains(&ANALYZE_SELECTED_ID));
        assert_eq!(
            actions.iter().filter(|a| a.targets_command("analyze")).count(),
            1
        );
    }

    #[test]
    fn selection_adds_analyze_in_modes_without_one() {
        let flags = ContextFlags {
            has_selection: true,
            ..Default::default()
        };
        let actions = contextual_actions(Mode::Features, &flags);
        assert_eq!(
            ids(&actions),
            vec!["feature-status", "new-feature", ANALYZE_SELECTED_ID]
        );
    }

    #[test]
    fn synthesized_actions_follow_base_in_fixed_order() {
        let flags = ContextFlags {
            has_selection: true,
            pending_confirmations: 2,
            blocker_count: 1,
        };
        let actions = contextual_actions(Mode::General, &flags);
        assert_eq!(
            ids(&actions),
            vec![
                "show-help",
                "project-status",
                ANALYZE_SELECTED_ID,
                REVIEW_PENDING_ID,
                VIEW_BLOCKERS_ID
            ]
        );
        assert_eq!(actions[3].label, "Review 2 Pending");
    }

    #[test]
    fn pending_review_skipped_when_base_targets_review() {
        let flags = ContextFlags {
            pending_confirmations: 4,
            ..Default::default()
        };
        let actions = contextual_actions(Mode::Stakeholders, &flags);
        assert!(!ids(&actions).contains(&REVIEW_PENDING_ID));
    }

    #[test]
    fn base_action_wins_id_collision_with_blockers() {
        let flags = ContextFlags {
            blocker_count: 3,
            ..Default::default()
        };
        let actions = contextual_actions(Mode::Strategy, &flags);
        let blockers: Vec<_> = actions.iter().filter(|a| a.id == VIEW_BLOCKERS_ID).collect();
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].label, "Strategy Blockers");
    }

    #[test]
    fn no_flags_means_base_actions_only() {
        let actions = contextual_actions(Mode::Overview, &ContextFlags::default());
        assert_eq!(ids(&actions), vec!["project-status", "run-foundation"]);
    }
}
