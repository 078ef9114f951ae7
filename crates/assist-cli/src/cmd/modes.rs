use crate::output::{print_json, print_table};
use anyhow::Result;
use assist_core::mode::{mode_for_view, profile};
use assist_core::types::View;

pub fn run(json: bool) -> Result<()> {
    let mut views: Vec<View> = View::known().to_vec();
    views.push(View::Other("(other)".to_string()));

    let entries: Vec<_> = views
        .iter()
        .map(|view| {
            let mode = mode_for_view(view);
            let p = profile(mode);
            let actions: Vec<String> = p.actions.iter().map(|a| a.id.clone()).collect();
            (view, mode, p.suggested_commands, actions)
        })
        .collect();

    if json {
        let out: Vec<_> = entries
            .iter()
            .map(|(view, mode, commands, actions)| {
                serde_json::json!({
                    "view": view,
                    "mode": mode,
                    "suggested_commands": commands,
                    "actions": actions,
                })
            })
            .collect();
        return print_json(&out);
    }

    let rows = entries
        .into_iter()
        .map(|(view, mode, commands, actions)| {
            let commands: Vec<String> = commands.iter().map(|c| format!("/{c}")).collect();
            vec![
                view.to_string(),
                mode.to_string(),
                commands.join(" "),
                actions.join(", "),
            ]
        })
        .collect();
    print_table(&["VIEW", "MODE", "COMMANDS", "ACTIONS"], rows);
    Ok(())
}
