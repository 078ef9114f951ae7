//! The stock command set every assistant session starts with.

use super::registry::{
    ArgSpec, ArgType, CommandContext, CommandDefinition, CommandRegistry, CommandResult,
    CommandSummary, ParsedCommand,
};
use crate::action::{ActionDescriptor, NavigationTarget};
use crate::backend::BackendClient;
use crate::mode::{profile, VIEW_BLOCKERS_ID};
use crate::session::Session;
use crate::types::{ActionVariant, EntityType, Priority, View};
use anyhow::Context;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub fn register_defaults(registry: &mut CommandRegistry, backend: Arc<dyn BackendClient>) {
    registry.register(
        CommandDefinition::new("help", "List commands, or show how to use one", |args, ctx| {
            help(args, ctx)
        })
        .alias("h")
        .alias("?")
        .arg(ArgSpec::optional("command", ArgType::Text)),
    );
    registry.register(
        CommandDefinition::new("status", "Summarize project readiness", |_, ctx| status(ctx))
            .alias("st"),
    );

    let b = backend.clone();
    registry.register(
        CommandDefinition::new(
            "analyze",
            "Analyze the selected entity, or the one given",
            move |args, ctx| analyze(b.clone(), args, ctx),
        )
        .alias("inspect")
        .arg(ArgSpec::optional("entity", ArgType::Entity)),
    );
    registry.register(
        CommandDefinition::new("review", "List items awaiting confirmation", |_, ctx| {
            review(ctx)
        })
        .alias("pending"),
    );
    registry.register(CommandDefinition::new(
        "blockers",
        "List what is blocking the project",
        |_, ctx| blockers(ctx),
    ));

    for (entity_type, extra) in [
        (EntityType::Stakeholder, "role"),
        (EntityType::Persona, "description"),
        (EntityType::Feature, "priority"),
    ] {
        let b = backend.clone();
        let noun = entity_type.as_str();
        registry.register(
            CommandDefinition::new(
                format!("create-{noun}"),
                format!("Create a {noun}"),
                move |args, _| create_entity(b.clone(), entity_type, extra, args),
            )
            .alias(&format!("add-{noun}"))
            .arg(ArgSpec::required("name", ArgType::Text))
            .arg(ArgSpec::optional(extra, ArgType::Text)),
        );
    }

    let b = backend.clone();
    registry.register(
        CommandDefinition::new(
            "update-status",
            "Change the status of an entity",
            move |args, ctx| update_status(b.clone(), args, ctx),
        )
        .alias("set-status")
        .arg(ArgSpec::required("entity", ArgType::Entity))
        .arg(ArgSpec::required("status", ArgType::Text)),
    );
    let b = backend.clone();
    registry.register(
        CommandDefinition::new("delete", "Delete an entity", move |args, ctx| {
            delete_entity(b.clone(), args, ctx)
        })
        .alias("remove")
        .arg(ArgSpec::required("entity", ArgType::Entity)),
    );
    let b = backend.clone();
    registry.register(
        CommandDefinition::new("confirm", "Mark an entity as confirmed", move |args, ctx| {
            confirm(b.clone(), args, ctx)
        })
        .arg(ArgSpec::required("entity", ArgType::Entity)),
    );
    let b = backend;
    registry.register(
        CommandDefinition::new(
            "run-foundation",
            "Start the foundation analysis job",
            move |_, ctx| run_foundation(b.clone(), ctx),
        )
        .alias("foundation"),
    );

    registry.register(
        CommandDefinition::new("goto", "Open a view", |args, _| goto(args))
            .alias("go")
            .alias("open")
            .arg(ArgSpec::required("view", ArgType::Text)),
    );
    registry.register(CommandDefinition::new(
        "mode",
        "Describe the current assistant mode",
        |_, ctx| describe_mode(ctx),
    ));
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

fn find_command<'a>(catalog: &'a [CommandSummary], name: &str) -> Option<&'a CommandSummary> {
    let name = name.trim_start_matches('/').to_ascii_lowercase();
    catalog
        .iter()
        .find(|c| c.name == name || c.aliases.iter().any(|a| *a == name))
}

async fn help(args: ParsedCommand, ctx: CommandContext) -> anyhow::Result<CommandResult> {
    let Some(wanted) = args.text("command") else {
        let mut out = String::from("Available commands:");
        for c in ctx.catalog.iter() {
            out.push_str(&format!("\n  {} - {}", c.usage, c.description));
            if !c.aliases.is_empty() {
                let aliases: Vec<String> = c.aliases.iter().map(|a| format!("/{a}")).collect();
                out.push_str(&format!(" (aliases: {})", aliases.join(", ")));
            }
        }
        return Ok(CommandResult::ok(out).with_data(json!({ "commands": &*ctx.catalog })));
    };

    match find_command(&ctx.catalog, wanted) {
        Some(c) => {
            let mut out = format!("{}\n  {}", c.usage, c.description);
            if !c.aliases.is_empty() {
                let aliases: Vec<String> = c.aliases.iter().map(|a| format!("/{a}")).collect();
                out.push_str(&format!("\n  aliases: {}", aliases.join(", ")));
            }
            Ok(CommandResult::ok(out).with_data(json!({ "command": c })))
        }
        None => {
            let prefix = wanted.trim_start_matches('/').to_ascii_lowercase();
            let suggestions: Vec<String> = ctx
                .catalog
                .iter()
                .filter(|c| {
                    c.name.starts_with(&prefix) || c.aliases.iter().any(|a| a.starts_with(&prefix))
                })
                .take(3)
                .map(|c| format!("/{}", c.name))
                .collect();
            let mut message = format!("No command named `/{prefix}`.");
            if !suggestions.is_empty() {
                message.push_str(&format!(" Did you mean {}?", suggestions.join(", ")));
            }
            Ok(CommandResult::failure(message).with_data(json!({ "suggestions": suggestions })))
        }
    }
}

fn blockers_action(count: usize) -> ActionDescriptor {
    ActionDescriptor::command(VIEW_BLOCKERS_ID, format!("View Blockers ({count})"), "/blockers")
        .with_variant(ActionVariant::Danger)
}

async fn status(ctx: CommandContext) -> anyhow::Result<CommandResult> {
    let data = &ctx.session.project_data;
    let mut lines = Vec::new();
    match data.readiness_score {
        Some(score) => lines.push(format!("Readiness: {score}%")),
        None => lines.push("Readiness: not scored yet".to_string()),
    }
    lines.push(format!("Blockers: {}", data.blockers.len()));
    lines.push(format!("Warnings: {}", data.warnings.len()));
    lines.push(format!("Pending confirmations: {}", data.pending_confirmations));
    if !data.entity_counts.is_empty() {
        let counts: Vec<String> = data
            .entity_counts
            .iter()
            .map(|(t, n)| format!("{} {}", n, t.collection()))
            .collect();
        lines.push(format!("Entities: {}", counts.join(", ")));
    }

    let mut result = CommandResult::ok(lines.join("\n")).with_data(json!(data));
    if !data.blockers.is_empty() {
        result = result.with_action(blockers_action(data.blockers.len()));
    }
    Ok(result)
}

async fn review(ctx: CommandContext) -> anyhow::Result<CommandResult> {
    let pending = ctx.session.project_data.pending_confirmations;
    if pending == 0 {
        return Ok(CommandResult::ok("Nothing is awaiting confirmation."));
    }
    let noun = if pending == 1 { "item is" } else { "items are" };
    Ok(
        CommandResult::ok(format!("{pending} {noun} awaiting confirmation."))
            .with_navigation(NavigationTarget::view(View::Review))
            .with_data(json!({ "pending_confirmations": pending })),
    )
}

async fn blockers(ctx: CommandContext) -> anyhow::Result<CommandResult> {
    let blockers = &ctx.session.project_data.blockers;
    if blockers.is_empty() {
        return Ok(CommandResult::ok("No blockers. Nice."));
    }
    let mut out = format!("{} blocker(s):", blockers.len());
    for b in blockers {
        out.push_str(&format!("\n  - {b}"));
    }
    Ok(CommandResult::ok(out).with_data(json!({ "blockers": blockers })))
}

async fn describe_mode(ctx: CommandContext) -> anyhow::Result<CommandResult> {
    let mode = ctx.session.mode();
    let p = profile(mode);
    let commands: Vec<String> = p.suggested_commands.iter().map(|c| format!("/{c}")).collect();
    Ok(CommandResult::ok(format!(
        "Mode: {mode} (view: {}). Try {}.",
        ctx.session.active_view,
        commands.join(", ")
    ))
    .with_data(json!({ "mode": mode, "suggested_commands": p.suggested_commands })))
}

async fn goto(args: ParsedCommand) -> anyhow::Result<CommandResult> {
    let raw = args.text("view").unwrap_or_default();
    let view = View::parse(raw);
    if matches!(view, View::Other(_)) {
        let known: Vec<&str> = View::known().iter().map(|v| v.as_str()).collect();
        return Ok(CommandResult::failure(format!(
            "Unknown view `{raw}`. Views: {}",
            known.join(", ")
        )));
    }
    Ok(CommandResult::ok(format!("Opening {view}."))
        .with_navigation(NavigationTarget::view(view)))
}

// ---------------------------------------------------------------------------
// Entity lookup
// ---------------------------------------------------------------------------

/// Resolve an entity argument to its type and id. Accepts `collection/id`
/// (e.g. `features/f-1`) or a bare id, which must then be the selection so
/// its type is known. An omitted argument means the selection.
fn locate_entity(
    token: Option<&str>,
    session: &Session,
) -> std::result::Result<(EntityType, String), String> {
    let selected = session.selected_entity.as_ref();
    match token {
        Some(token) => {
            if let Some((kind, id)) = token.split_once('/') {
                let entity_type = kind
                    .parse::<EntityType>()
                    .map_err(|_| format!("Unknown entity type `{kind}`."))?;
                return Ok((entity_type, id.to_string()));
            }
            match selected {
                Some(sel) if sel.id == token => Ok((sel.entity_type, sel.id.clone())),
                _ => Err(format!(
                    "Cannot tell what `{token}` is. Select it first or write it as \
                     <type>/{token}, for example features/{token}."
                )),
            }
        }
        None => selected
            .map(|sel| (sel.entity_type, sel.id.clone()))
            .ok_or_else(|| "Nothing selected. Select an entity or name one.".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Mutating commands
// ---------------------------------------------------------------------------

async fn analyze(
    backend: Arc<dyn BackendClient>,
    args: ParsedCommand,
    ctx: CommandContext,
) -> anyhow::Result<CommandResult> {
    let (entity_type, id) = match locate_entity(args.text("entity"), &ctx.session) {
        Ok(found) => found,
        Err(message) => return Ok(CommandResult::failure(message)),
    };
    let job = backend
        .create(
            "jobs",
            json!({
                "kind": "analysis",
                "project_id": ctx.session.project_id,
                "entity_type": entity_type,
                "entity_id": id,
            }),
        )
        .await
        .with_context(|| format!("could not start analysis of {entity_type} {id}"))?;
    Ok(
        CommandResult::ok(format!("Analyzing {entity_type} {id}. Results land in the review queue."))
            .with_action(
                ActionDescriptor::navigation(
                    "open-analyzed",
                    "Open",
                    NavigationTarget::entity(entity_type, id),
                ),
            )
            .with_data(job),
    )
}

async fn create_entity(
    backend: Arc<dyn BackendClient>,
    entity_type: EntityType,
    extra: &'static str,
    args: ParsedCommand,
) -> anyhow::Result<CommandResult> {
    let name = args.text("name").unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Ok(CommandResult::failure(format!("A {entity_type} needs a name.")));
    }

    let mut body = Map::new();
    body.insert("name".to_string(), json!(name));
    if let Some(value) = args.text(extra) {
        if extra == "priority" {
            if let Err(e) = value.parse::<Priority>() {
                return Ok(CommandResult::failure(format!("{e}. Use low, medium or high.")));
            }
        }
        body.insert(extra.to_string(), json!(value));
    }

    let record = backend
        .create(entity_type.collection(), Value::Object(body))
        .await
        .with_context(|| format!("could not create {entity_type} '{name}'"))?;
    let mut result = CommandResult::ok(format!("Created {entity_type} **{name}**."));
    if let Some(id) = record.get("id").and_then(Value::as_str) {
        result = result.with_action(
            ActionDescriptor::navigation(
                format!("open-{id}"),
                format!("Open {name}"),
                NavigationTarget::entity(entity_type, id),
            )
            .with_variant(ActionVariant::Primary),
        );
    }
    Ok(result.with_data(record))
}

async fn update_status(
    backend: Arc<dyn BackendClient>,
    args: ParsedCommand,
    ctx: CommandContext,
) -> anyhow::Result<CommandResult> {
    let (entity_type, id) = match locate_entity(args.text("entity"), &ctx.session) {
        Ok(found) => found,
        Err(message) => return Ok(CommandResult::failure(message)),
    };
    let status = args.text("status").unwrap_or_default().to_string();
    let record = backend
        .update(entity_type.collection(), &id, json!({ "status": status }))
        .await
        .with_context(|| format!("could not update {entity_type} {id}"))?;
    Ok(CommandResult::ok(format!("Set {entity_type} {id} to {status}.")).with_data(record))
}

async fn delete_entity(
    backend: Arc<dyn BackendClient>,
    args: ParsedCommand,
    ctx: CommandContext,
) -> anyhow::Result<CommandResult> {
    let (entity_type, id) = match locate_entity(args.text("entity"), &ctx.session) {
        Ok(found) => found,
        Err(message) => return Ok(CommandResult::failure(message)),
    };
    let record = backend
        .delete(entity_type.collection(), &id)
        .await
        .with_context(|| format!("could not delete {entity_type} {id}"))?;
    Ok(CommandResult::ok(format!("Deleted {entity_type} {id}."))
        .with_navigation(NavigationTarget::view(entity_type.home_view()))
        .with_data(record))
}

async fn confirm(
    backend: Arc<dyn BackendClient>,
    args: ParsedCommand,
    ctx: CommandContext,
) -> anyhow::Result<CommandResult> {
    let (entity_type, id) = match locate_entity(args.text("entity"), &ctx.session) {
        Ok(found) => found,
        Err(message) => return Ok(CommandResult::failure(message)),
    };
    let record = backend
        .update(
            entity_type.collection(),
            &id,
            json!({ "confirmation_status": "confirmed" }),
        )
        .await
        .with_context(|| format!("could not confirm {entity_type} {id}"))?;
    Ok(CommandResult::ok(format!("Confirmed {entity_type} {id}.")).with_data(record))
}

async fn run_foundation(
    backend: Arc<dyn BackendClient>,
    ctx: CommandContext,
) -> anyhow::Result<CommandResult> {
    let job = backend
        .create(
            "jobs",
            json!({ "kind": "foundation", "project_id": ctx.session.project_id }),
        )
        .await
        .context("could not start the foundation job")?;
    Ok(
        CommandResult::ok("Foundation analysis started. I'll let you know when it finishes.")
            .with_action(
                ActionDescriptor::navigation(
                    "view-foundation",
                    "View Foundation",
                    NavigationTarget::view(View::Foundation),
                )
                .with_variant(ActionVariant::Primary),
            )
            .with_data(job),
    )
}
