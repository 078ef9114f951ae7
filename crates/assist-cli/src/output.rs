use assist_core::action::ActionDescriptor;
use assist_core::commands::CommandResult;
use assist_core::message::{Message, ProactiveMessage};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One JSON document per line, for the REPL's `--json` mode.
pub fn print_json_line<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    println!("{}", render(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        println!("{}", render(row));
    }
}

// ---------------------------------------------------------------------------
// Chat rendering
// ---------------------------------------------------------------------------

pub fn print_message(message: &Message) {
    for (i, line) in message.content.lines().enumerate() {
        if i == 0 {
            println!("{}> {line}", message.role);
        } else {
            println!("  {line}");
        }
    }
}

pub fn print_result(result: &CommandResult) {
    let marker = if result.success { "ok" } else { "failed" };
    println!("[{marker}] {}", result.message);
}

pub fn action_summary(actions: &[ActionDescriptor]) -> String {
    actions
        .iter()
        .map(|a| format!("{} ({})", a.label, a.id))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_proactive(message: &ProactiveMessage) {
    println!("* [{}] {}", message.priority, message.text);
    if !message.actions.is_empty() {
        println!("    actions: {}", action_summary(&message.actions));
    }
}
