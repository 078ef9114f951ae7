use crate::output::{print_json, print_table};
use crate::settings::Settings;
use anyhow::Result;

pub fn run(settings: &Settings, json: bool) -> Result<()> {
    let config = settings.load_config()?;
    let catalog = settings.command_registry(&config)?.catalog();

    if json {
        return print_json(&*catalog);
    }

    let rows = catalog
        .iter()
        .map(|c| {
            let aliases: Vec<String> = c.aliases.iter().map(|a| format!("/{a}")).collect();
            vec![
                c.usage.clone(),
                aliases.join(", "),
                c.description.clone(),
            ]
        })
        .collect();
    print_table(&["USAGE", "ALIASES", "DESCRIPTION"], rows);
    Ok(())
}
