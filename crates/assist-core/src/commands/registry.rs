use super::tokenize::tokenize_spans;
use crate::action::{ActionDescriptor, NavigationTarget};
use crate::error::{AssistError, Result};
use crate::session::Session;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key under which an unknown or argument-less command receives its
/// remainder text.
pub const INPUT_ARG: &str = "input";

pub fn is_command(input: &str) -> bool {
    input
        .trim_start()
        .strip_prefix('/')
        .is_some_and(|rest| rest.chars().next().is_some_and(|c| !c.is_whitespace()))
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    Text,
    Number,
    Flag,
    /// An entity id. Falls back to the selection when omitted, if the
    /// handler chooses to.
    Entity,
}

impl ArgType {
    fn expected(self) -> &'static str {
        match self {
            ArgType::Text | ArgType::Entity => "text",
            ArgType::Number => "a number",
            ArgType::Flag => "true/false",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgType,
    pub required: bool,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>, kind: ArgType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl ArgValue {
    fn convert(spec: &ArgSpec, token: &str) -> Result<ArgValue> {
        let invalid = || AssistError::InvalidArgument {
            argument: spec.name.clone(),
            value: token.to_string(),
            expected: spec.kind.expected().to_string(),
        };
        match spec.kind {
            ArgType::Text | ArgType::Entity => Ok(ArgValue::Text(token.to_string())),
            ArgType::Number => token
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ArgValue::Number)
                .ok_or_else(invalid),
            ArgType::Flag => match token.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(ArgValue::Flag(true)),
                "false" | "no" | "off" | "0" => Ok(ArgValue::Flag(false)),
                _ => Err(invalid()),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ArgValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ParsedCommand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCommand {
    /// Primary name when the command resolved, else the lowercased input name.
    pub name: String,
    pub args: BTreeMap<String, ArgValue>,
    pub raw_args: Vec<String>,
}

impl ParsedCommand {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(ArgValue::as_text)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.args.get(name).and_then(ArgValue::as_number)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.args.get(name).and_then(ArgValue::as_flag)
    }

    /// Opaque remainder for commands without declared arguments.
    pub fn input(&self) -> Option<&str> {
        self.text(INPUT_ARG)
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigate_to: Option<NavigationTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_navigation(mut self, target: NavigationTarget) -> Self {
        self.navigate_to = Some(target);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ---------------------------------------------------------------------------
// CommandDefinition
// ---------------------------------------------------------------------------

/// Name, aliases and usage of a registered command, as shown by `/help`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub usage: String,
}

/// What a handler receives besides its arguments.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Snapshot taken when the command started.
    pub session: Session,
    pub catalog: Arc<[CommandSummary]>,
}

pub type CommandFuture = BoxFuture<'static, anyhow::Result<CommandResult>>;
pub type CommandHandler = Arc<dyn Fn(ParsedCommand, CommandContext) -> CommandFuture + Send + Sync>;

#[derive(Clone)]
pub struct CommandDefinition {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub handler: CommandHandler,
}

impl CommandDefinition {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ParsedCommand, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandResult>> + Send + 'static,
    {
        Self {
            name: normalize(&name.into()),
            aliases: Vec::new(),
            description: description.into(),
            args: Vec::new(),
            handler: Arc::new(move |args, ctx| handler(args, ctx).boxed()),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(normalize(alias));
        self
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    pub fn usage(&self) -> String {
        let mut usage = format!("/{}", self.name);
        for spec in &self.args {
            if spec.required {
                usage.push_str(&format!(" <{}>", spec.name));
            } else {
                usage.push_str(&format!(" [{}]", spec.name));
            }
        }
        usage
    }

    pub fn summary(&self) -> CommandSummary {
        CommandSummary {
            name: self.name.clone(),
            aliases: self.aliases.clone(),
            description: self.description.clone(),
            usage: self.usage(),
        }
    }

    fn matches_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix) || self.aliases.iter().any(|a| a.starts_with(prefix))
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("args", &self.args)
            .finish()
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('/').to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// CommandRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CommandRegistry {
    by_key: HashMap<String, Arc<CommandDefinition>>,
    /// Distinct definitions in registration order.
    ordered: Vec<Arc<CommandDefinition>>,
    max_suggestions: usize,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            ordered: Vec::new(),
            max_suggestions: 3,
        }
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    /// Store `definition` under its name and every alias. A colliding key
    /// is overwritten by the later registration.
    pub fn register(&mut self, definition: CommandDefinition) {
        let def = Arc::new(definition);
        match self.ordered.iter_mut().find(|d| d.name == def.name) {
            Some(existing) => {
                // drop keys that only the replaced definition answered to
                let old = std::mem::replace(existing, def.clone());
                self.by_key.retain(|_, d| !Arc::ptr_eq(d, &old));
            }
            None => self.ordered.push(def.clone()),
        }
        self.by_key.insert(def.name.clone(), def.clone());
        for alias in &def.aliases {
            self.by_key.insert(alias.clone(), def.clone());
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<CommandDefinition>> {
        self.by_key.get(&normalize(name)).cloned()
    }

    /// Distinct definitions whose name or any alias starts with `prefix`,
    /// in registration order.
    pub fn suggest(&self, prefix: &str) -> Vec<Arc<CommandDefinition>> {
        let prefix = normalize(prefix);
        self.ordered
            .iter()
            .filter(|d| d.matches_prefix(&prefix))
            .cloned()
            .collect()
    }

    pub fn definitions(&self) -> &[Arc<CommandDefinition>] {
        &self.ordered
    }

    pub fn catalog(&self) -> Arc<[CommandSummary]> {
        self.ordered.iter().map(|d| d.summary()).collect()
    }

    pub fn parse(&self, input: &str) -> Result<ParsedCommand> {
        let trimmed = input.trim();
        let rest = trimmed
            .strip_prefix('/')
            .ok_or_else(|| AssistError::NotACommand(trimmed.to_string()))?;
        let spans = tokenize_spans(rest);
        let Some(first) = spans.first() else {
            return Err(AssistError::NotACommand(trimmed.to_string()));
        };
        let name = normalize(&first.text);
        let remainder = rest[first.end..].trim();
        let tokens: Vec<String> = spans[1..].iter().map(|s| s.text.clone()).collect();
        self.assign(name, tokens, remainder)
    }

    /// Build a parsed command from a name and already-split tokens.
    pub fn parse_parts(&self, name: &str, tokens: Vec<String>) -> Result<ParsedCommand> {
        let remainder = tokens.join(" ");
        self.assign(normalize(name), tokens, &remainder)
    }

    fn assign(&self, name: String, tokens: Vec<String>, remainder: &str) -> Result<ParsedCommand> {
        let mut args = BTreeMap::new();
        let name = match self.resolve(&name) {
            Some(def) if !def.args.is_empty() => {
                for (spec, token) in def.args.iter().zip(tokens.iter()) {
                    args.insert(spec.name.clone(), ArgValue::convert(spec, token)?);
                }
                def.name.clone()
            }
            Some(def) => {
                if !remainder.is_empty() {
                    args.insert(INPUT_ARG.to_string(), ArgValue::Text(remainder.to_string()));
                }
                def.name.clone()
            }
            None => {
                if !remainder.is_empty() {
                    args.insert(INPUT_ARG.to_string(), ArgValue::Text(remainder.to_string()));
                }
                name
            }
        };
        Ok(ParsedCommand {
            name,
            args,
            raw_args: tokens,
        })
    }

    fn unknown_command(&self, name: &str) -> CommandResult {
        let suggestions: Vec<String> = self
            .suggest(name)
            .into_iter()
            .take(self.max_suggestions)
            .map(|d| format!("/{}", d.name))
            .collect();
        let message = if suggestions.is_empty() {
            format!("Unknown command `/{name}`. Type /help to see all commands.")
        } else {
            format!(
                "Unknown command `/{name}`. Did you mean {}? Type /help to see all commands.",
                suggestions.join(", ")
            )
        };
        CommandResult::failure(message).with_data(serde_json::json!({ "suggestions": suggestions }))
    }

    /// Run a parsed command. Never fails: unknown commands, missing
    /// arguments and handler errors all come back as failure results.
    pub async fn execute(&self, parsed: ParsedCommand, session: Session) -> CommandResult {
        let Some(def) = self.resolve(&parsed.name) else {
            debug!(command = %parsed.name, "unknown command");
            return self.unknown_command(&parsed.name);
        };

        if let Some(missing) = def
            .args
            .iter()
            .find(|spec| spec.required && !parsed.args.contains_key(&spec.name))
        {
            let err = AssistError::MissingArgument {
                command: def.name.clone(),
                argument: missing.name.clone(),
            };
            return CommandResult::failure(format!("{err}. Usage: {}", def.usage()));
        }

        info!(command = %def.name, args = parsed.raw_args.len(), "executing command");
        let ctx = CommandContext {
            session,
            catalog: self.catalog(),
        };
        let outcome = AssertUnwindSafe((def.handler)(parsed, ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(command = %def.name, error = %format!("{e:#}"), "command handler failed");
                CommandResult::failure(format!("{e:#}"))
            }
            Err(_) => {
                warn!(command = %def.name, "command handler panicked");
                CommandResult::failure(format!("/{} failed unexpectedly", def.name))
            }
        }
    }

    /// Parse and run a raw `/name args` string.
    pub async fn execute_input(&self, input: &str, session: Session) -> CommandResult {
        match self.parse(input) {
            Ok(parsed) => self.execute(parsed, session).await,
            Err(e) => CommandResult::failure(format!("{e}. Type /help to see all commands.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(name: &str) -> CommandDefinition {
        CommandDefinition::new(name, format!("{name} command"), |args, _ctx| async move {
            Ok(CommandResult::ok(format!("ran {}", args.name)))
        })
    }

    fn registry() -> CommandRegistry {
        let mut reg = CommandRegistry::new();
        reg.register(
            echo("help")
                .alias("h")
                .alias("?")
                .arg(ArgSpec::optional("command", ArgType::Text)),
        );
        reg.register(
            echo("create-stakeholder")
                .alias("add-stakeholder")
                .arg(ArgSpec::required("name", ArgType::Text))
                .arg(ArgSpec::optional("role", ArgType::Text)),
        );
        reg.register(echo("create-persona").arg(ArgSpec::required("name", ArgType::Text)));
        reg.register(echo("create-feature").arg(ArgSpec::required("name", ArgType::Text)));
        reg.register(echo("run-foundation"));
        reg.register(echo("status"));
        reg
    }

    #[test]
    fn reregistering_drops_aliases_the_new_definition_lacks() {
        let mut reg = registry();
        reg.register(echo("help").alias("?"));

        assert!(reg.resolve("h").is_none());
        let help = reg.resolve("?").unwrap();
        assert!(Arc::ptr_eq(&help, &reg.resolve("help").unwrap()));
        assert_eq!(reg.definitions().len(), 6);
        assert!(reg.definitions().iter().any(|d| Arc::ptr_eq(d, &help)));
    }

    #[test]
    fn aliases_resolve_to_the_same_definition() {
        let reg = registry();
        for def in reg.definitions() {
            let primary = reg.resolve(&def.name).unwrap();
            for alias in &def.aliases {
                assert!(Arc::ptr_eq(&reg.resolve(alias).unwrap(), &primary));
            }
        }
    }

    #[test]
    fn resolve_is_case_insensitive_and_slash_tolerant() {
        let reg = registry();
        assert_eq!(reg.resolve("HELP").unwrap().name, "help");
        assert_eq!(reg.resolve("/Add-Stakeholder").unwrap().name, "create-stakeholder");
        assert!(reg.resolve("nope").is_none());
    }

    #[test]
    fn later_registration_wins() {
        let mut reg = registry();
        reg.register(echo("status").alias("h").arg(ArgSpec::optional("x", ArgType::Text)));
        assert_eq!(reg.resolve("h").unwrap().name, "status");
        assert_eq!(reg.resolve("status").unwrap().args.len(), 1);
        assert_eq!(
            reg.definitions().iter().filter(|d| d.name == "status").count(),
            1
        );
    }

    #[test]
    fn suggest_dedups_by_primary_name_in_registration_order() {
        let reg = registry();
        let names: Vec<_> = reg.suggest("create").iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["create-stakeholder", "create-persona", "create-feature"]);
        // matches both the name "help" and the alias "h"; listed once
        let h: Vec<_> = reg.suggest("H").iter().map(|d| d.name.clone()).collect();
        assert_eq!(h, vec!["help"]);
        let add: Vec<_> = reg.suggest("add").iter().map(|d| d.name.clone()).collect();
        assert_eq!(add, vec!["create-stakeholder"]);
    }

    #[test]
    fn parse_help_with_command_argument() {
        let parsed = registry().parse("/help run-foundation").unwrap();
        assert_eq!(parsed.name, "help");
        assert_eq!(parsed.text("command"), Some("run-foundation"));
        assert_eq!(parsed.args.len(), 1);
    }

    #[test]
    fn parse_quoted_argument() {
        let parsed = registry().parse(r#"/create-stakeholder "John Smith""#).unwrap();
        assert_eq!(parsed.name, "create-stakeholder");
        assert_eq!(parsed.raw_args, vec!["John Smith"]);
        assert_eq!(parsed.text("name"), Some("John Smith"));
        assert!(parsed.text("role").is_none());
    }

    #[test]
    fn parse_drops_extra_tokens_for_typed_commands() {
        let parsed = registry().parse("/create-persona Ana extra words").unwrap();
        assert_eq!(parsed.args.len(), 1);
        assert_eq!(parsed.raw_args.len(), 3);
    }

    #[test]
    fn unknown_and_untyped_commands_get_whole_remainder() {
        let reg = registry();
        let parsed = reg.parse(r#"/run-foundation  with "all the" data "#).unwrap();
        assert_eq!(parsed.input(), Some(r#"with "all the" data"#));
        let unknown = reg.parse("/mystery a b").unwrap();
        assert_eq!(unknown.name, "mystery");
        assert_eq!(unknown.input(), Some("a b"));
        assert!(reg.parse("/status").unwrap().args.is_empty());
    }

    #[test]
    fn parse_rejects_non_commands() {
        let reg = registry();
        assert!(matches!(reg.parse("hello"), Err(AssistError::NotACommand(_))));
        assert!(matches!(reg.parse("/  "), Err(AssistError::NotACommand(_))));
    }

    #[test]
    fn typed_conversion_failure_is_usage_error() {
        let mut reg = CommandRegistry::new();
        reg.register(
            echo("score")
                .arg(ArgSpec::required("value", ArgType::Number))
                .arg(ArgSpec::optional("final", ArgType::Flag)),
        );
        let parsed = reg.parse("/score 72.5 yes").unwrap();
        assert_eq!(parsed.number("value"), Some(72.5));
        assert_eq!(parsed.flag("final"), Some(true));
        let err = reg.parse("/score lots").unwrap_err();
        assert!(matches!(err, AssistError::InvalidArgument { .. }));
    }

    #[test]
    fn is_command_requires_leading_slash_and_name() {
        assert!(is_command("/help"));
        assert!(is_command("  /status"));
        assert!(!is_command("/ help"));
        assert!(!is_command("/"));
        assert!(!is_command("what is /help"));
    }

    #[test]
    fn usage_marks_required_and_optional() {
        let reg = registry();
        assert_eq!(
            reg.resolve("create-stakeholder").unwrap().usage(),
            "/create-stakeholder <name> [role]"
        );
    }

    #[tokio::test]
    async fn unknown_command_embeds_at_most_three_suggestions() {
        let reg = registry();
        let result = reg.execute_input("/create", Session::new("p")).await;
        assert!(!result.success);
        assert!(result.message.contains("/help"));
        let suggestions = result.data.unwrap()["suggestions"].as_array().unwrap().clone();
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0], "/create-stakeholder");

        let mut many = registry();
        many.register(echo("create-driver"));
        let result = many.execute_input("/create", Session::new("p")).await;
        let suggestions = result.data.unwrap()["suggestions"].as_array().unwrap().clone();
        assert_eq!(suggestions.len(), 3);
    }

    #[tokio::test]
    async fn unknown_command_without_prefix_match_has_no_suggestions() {
        let result = registry()
            .execute_input("/unknown-cmd", Session::new("p"))
            .await;
        assert!(!result.success);
        assert!(result.message.starts_with("Unknown command `/unknown-cmd`."));
        assert!(!result.message.contains("Did you mean"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_reported_with_usage() {
        let result = registry()
            .execute_input("/add-stakeholder", Session::new("p"))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("'name'"));
        assert!(result.message.contains("/create-stakeholder <name> [role]"));
    }

    #[tokio::test]
    async fn handler_errors_become_failure_results() {
        let mut reg = CommandRegistry::new();
        reg.register(CommandDefinition::new("explode", "fails", |_, _| async {
            Err::<CommandResult, _>(anyhow::anyhow!("backend said no"))
        }));
        let result = reg.execute_input("/explode", Session::new("p")).await;
        assert!(!result.success);
        assert_eq!(result.message, "backend said no");
    }

    #[tokio::test]
    async fn handler_sees_catalog_and_snapshot() {
        let mut reg = registry();
        reg.register(CommandDefinition::new("whoami", "echo project", |_, ctx| async move {
            Ok(CommandResult::ok(format!(
                "{} / {} commands",
                ctx.session.project_id,
                ctx.catalog.len()
            )))
        }));
        let result = reg.execute_input("/whoami", Session::new("acme")).await;
        assert_eq!(result.message, "acme / 7 commands");
    }
}
