use crate::output::print_json;
use crate::settings::Settings;
use anyhow::Result;
use assist_core::commands::ArgValue;

pub fn run(settings: &Settings, input: &str, json: bool) -> Result<()> {
    let config = settings.load_config()?;
    let registry = settings.command_registry(&config)?;
    let parsed = registry.parse(input)?;
    let resolved = registry.resolve(&parsed.name).is_some();

    if json {
        return print_json(&serde_json::json!({
            "name": parsed.name,
            "resolved": resolved,
            "args": parsed.args,
            "raw_args": parsed.raw_args,
        }));
    }

    if resolved {
        println!("command: /{}", parsed.name);
    } else {
        println!("command: /{} (unknown)", parsed.name);
    }
    for (name, value) in &parsed.args {
        let shown = match value {
            ArgValue::Text(s) => format!("{s:?}"),
            ArgValue::Number(n) => n.to_string(),
            ArgValue::Flag(b) => b.to_string(),
        };
        println!("  {name} = {shown}");
    }
    if !parsed.raw_args.is_empty() {
        println!("  raw: {:?}", parsed.raw_args);
    }
    Ok(())
}
