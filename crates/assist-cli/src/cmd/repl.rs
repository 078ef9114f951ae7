use crate::http::{HttpBackend, HttpCompletion};
use crate::output::{action_summary, print_json_line, print_message, print_proactive, print_result};
use crate::settings::Settings;
use anyhow::{bail, Context, Result};
use assist_core::commands::tokenize;
use assist_core::config::EngineConfig;
use assist_core::message::ProactiveMessage;
use assist_core::session::{ActionOutcome, Assistant, EntitySelection, ProjectDataPatch};
use assist_core::triggers::ExternalEvent;
use assist_core::types::{EntityType, Mode, View};
use std::collections::HashSet;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HOST_EVENTS: &str = "\
Host events:
  :view <name>                       switch view
  :mode <mode>                       override the mode until the next view change
  :select <type> <id> [status]       select an entity
  :deselect                          clear the selection
  :actions                           list suggested actions
  :action <id>                       run a suggested or proactive action
  :pending                           list the proactive queue with positions
  :dismiss <position>                dismiss a proactive message
  :evaluate                          evaluate every trigger category once
  :data <json>                       merge project data, e.g. {\"readiness_score\": 40}
  :event added <kind> <count>        report new items
  :event processed <kind> <ok> [failed]
  :clear                             clear the chat log
  :quit                              leave
Anything else is sent as a chat message; /help lists slash commands.";

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let config = settings.load_config()?;
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(session_loop(settings, config, json))
}

fn build_assistant(settings: &Settings, config: EngineConfig) -> Result<Assistant> {
    let commands = settings.command_registry(&config)?;
    let mut builder = Assistant::builder(settings.project.clone())
        .config(config)
        .commands(commands);

    if let Some(url) = &settings.completion_url {
        let completion = HttpCompletion::new(url)?;
        builder = builder.completion(move |text, snapshot| {
            let completion = completion.clone();
            async move { completion.complete(text, snapshot).await }
        });
    }
    if let Some(url) = &settings.backend_url {
        let backend = Arc::new(HttpBackend::new(url, &settings.project)?);
        builder = builder.refresh(move |_project| {
            let backend = backend.clone();
            async move { Ok(backend.project_data().await?) }
        });
    }
    Ok(builder.build())
}

enum Flow {
    Continue,
    Quit,
}

struct Repl {
    assistant: Assistant,
    json: bool,
    /// Proactive messages already printed, by source and text.
    shown: HashSet<(Option<String>, String)>,
}

async fn session_loop(settings: &Settings, config: EngineConfig, json: bool) -> Result<()> {
    let mut repl = Repl {
        assistant: build_assistant(settings, config)?,
        json,
        shown: HashSet::new(),
    };
    tracing::info!(project = %settings.project, "session started");

    let interactive = std::io::stdin().is_terminal();
    if interactive {
        println!("assist: project {}. Type :help for host events, /help for commands.", settings.project);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush().ok();
        }
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let flow = if line.starts_with(':') {
            match repl.host_event(line).await {
                Ok(flow) => flow,
                Err(e) => {
                    eprintln!("error: {e:#}");
                    Flow::Continue
                }
            }
        } else {
            repl.chat(line).await?;
            Flow::Continue
        };
        if matches!(flow, Flow::Quit) {
            break;
        }
        repl.print_new_proactive()?;
    }

    repl.assistant.shutdown();
    Ok(())
}

impl Repl {
    async fn chat(&mut self, line: &str) -> Result<()> {
        let Some(reply) = self.assistant.send_message(line).await else {
            return Ok(());
        };
        if self.json {
            print_json_line(&reply)?;
        } else {
            print_message(&reply);
        }
        Ok(())
    }

    fn print_new_proactive(&mut self) -> Result<()> {
        let visible = self.assistant.visible_proactive_messages();
        self.shown
            .retain(|(source, text)| visible.iter().any(|m| &m.source == source && &m.text == text));
        for message in visible {
            if !self.shown.insert(shown_key(&message)) {
                continue;
            }
            if self.json {
                print_json_line(&serde_json::json!({ "proactive": message }))?;
            } else {
                print_proactive(&message);
            }
        }
        Ok(())
    }

    async fn await_evaluation(handle: Option<tokio::task::JoinHandle<()>>) -> Result<()> {
        if let Some(handle) = handle {
            handle.await.context("trigger evaluation task failed")?;
        }
        Ok(())
    }

    async fn host_event(&mut self, line: &str) -> Result<Flow> {
        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args = tokenize(rest);

        match head {
            ":quit" | ":q" | ":exit" => return Ok(Flow::Quit),
            ":help" | ":?" => println!("{HOST_EVENTS}"),
            ":view" => {
                let Some(name) = args.first() else {
                    bail!("usage: :view <name>");
                };
                let handle = self.assistant.set_active_view(View::parse(name));
                Self::await_evaluation(handle).await?;
                let s = self.assistant.session();
                println!("view: {} (mode: {})", s.active_view, s.mode());
            }
            ":mode" => {
                let Some(name) = args.first() else {
                    bail!("usage: :mode <mode>");
                };
                let mode: Mode = name.parse()?;
                self.assistant.set_mode(mode);
                println!("mode: {mode}");
            }
            ":select" => {
                let [kind, id, status @ ..] = args.as_slice() else {
                    bail!("usage: :select <type> <id> [status]");
                };
                let entity_type: EntityType = kind.parse()?;
                let status = status.first().map(String::as_str).unwrap_or("draft");
                let handle = self
                    .assistant
                    .select_entity(Some(EntitySelection::new(id.as_str(), entity_type, status)));
                Self::await_evaluation(handle).await?;
                println!("selected {entity_type} {id} ({status})");
            }
            ":deselect" => {
                self.assistant.select_entity(None);
                println!("selection cleared");
            }
            ":actions" => {
                let actions = self.assistant.suggested_actions();
                if self.json {
                    print_json_line(&actions)?;
                } else if actions.is_empty() {
                    println!("no suggested actions");
                } else {
                    println!("actions: {}", action_summary(&actions));
                }
            }
            ":action" => {
                let Some(id) = args.first() else {
                    bail!("usage: :action <id>");
                };
                match self.assistant.execute_quick_action(id).await? {
                    ActionOutcome::Command(result) => {
                        if self.json {
                            print_json_line(&result)?;
                        } else {
                            print_result(&result);
                        }
                    }
                    ActionOutcome::Callback(Ok(())) => println!("[ok] {id}"),
                    ActionOutcome::Callback(Err(e)) => println!("[failed] {id}: {e}"),
                    ActionOutcome::Navigated(target) => println!("navigated to {}", target.view),
                }
            }
            ":pending" => {
                let pending = self.assistant.session().pending_proactive_messages;
                if pending.is_empty() {
                    println!("no pending messages");
                }
                for (i, m) in pending.iter().enumerate() {
                    println!("{i}: [{}] {}", m.priority, m.text);
                }
            }
            ":dismiss" => {
                let Some(position) = args.first() else {
                    bail!("usage: :dismiss <position>");
                };
                let index: usize = position
                    .parse()
                    .with_context(|| format!("'{position}' is not a queue position"))?;
                self.assistant.dismiss_proactive_message(index)?;
                println!("dismissed {index}");
            }
            ":evaluate" => {
                let added = self.assistant.evaluate_all_triggers().await;
                println!("{added} message(s) raised");
            }
            ":data" => {
                let patch: ProjectDataPatch =
                    serde_json::from_str(rest).context("expected a project data JSON object")?;
                self.assistant.merge_project_data(patch);
                println!("project data updated");
            }
            ":event" => {
                let event = parse_event(&args)?;
                let handle = self.assistant.notify_external(event);
                Self::await_evaluation(handle).await?;
            }
            ":clear" => {
                self.assistant.clear_messages();
                println!("chat cleared");
            }
            other => bail!("unknown host event {other} (try :help)"),
        }
        Ok(Flow::Continue)
    }
}

fn shown_key(message: &ProactiveMessage) -> (Option<String>, String) {
    (message.source.clone(), message.text.clone())
}

fn parse_count(value: &str) -> Result<u32> {
    value
        .parse()
        .with_context(|| format!("'{value}' is not a count"))
}

fn parse_event(args: &[String]) -> Result<ExternalEvent> {
    match args {
        [kind, what, count] if kind == "added" => Ok(ExternalEvent::ItemsAdded {
            kind: what.clone(),
            count: parse_count(count)?,
        }),
        [kind, what, ok, rest @ ..] if kind == "processed" => Ok(ExternalEvent::ProcessingComplete {
            kind: what.clone(),
            succeeded: parse_count(ok)?,
            failed: rest.first().map(|f| parse_count(f)).transpose()?.unwrap_or(0),
        }),
        _ => bail!("usage: :event added <kind> <count> | :event processed <kind> <ok> [failed]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn parses_added_and_processed_events() {
        assert_eq!(
            parse_event(&words("added signals 4")).unwrap(),
            ExternalEvent::ItemsAdded {
                kind: "signals".into(),
                count: 4
            }
        );
        assert_eq!(
            parse_event(&words(r#"processed "signal batch" 9 1"#)).unwrap(),
            ExternalEvent::ProcessingComplete {
                kind: "signal batch".into(),
                succeeded: 9,
                failed: 1
            }
        );
        assert!(parse_event(&words("added signals many")).is_err());
        assert!(parse_event(&words("exploded")).is_err());
    }

    #[tokio::test]
    async fn shown_set_forgets_messages_that_left_the_queue() {
        let mut repl = Repl {
            assistant: Assistant::builder("p").build(),
            json: true,
            shown: HashSet::new(),
        };
        repl.assistant
            .notify_external(ExternalEvent::ItemsAdded {
                kind: "signals".into(),
                count: 2,
            })
            .unwrap()
            .await
            .unwrap();
        repl.print_new_proactive().unwrap();
        assert_eq!(repl.shown.len(), 1);

        repl.assistant.dismiss_proactive_message(0).unwrap();
        repl.print_new_proactive().unwrap();
        assert!(repl.shown.is_empty());
    }
}
