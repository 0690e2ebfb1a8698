//! Schemas command - list what the store has loaded

use console::style;

use crate::error::Result;

use super::StoreArgs;

pub fn run(store_args: &StoreArgs, json_output: bool) -> Result<()> {
    let store = store_args.load_store()?;
    let indexes = store.indexes();
    let modules = store.module_names();

    if json_output {
        let output = serde_json::json!({
            "schemas": indexes,
            "modules": modules,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", style("Schemas").cyan().bold());
    if indexes.is_empty() {
        println!("  {} No schemas loaded", style("⚠").yellow());
    }
    for index in &indexes {
        let origin = store.get(index).map(|schema| schema.origin()).unwrap_or_default();
        println!(
            "  {} {} {}",
            style(&index.kind).bold(),
            index.version,
            style(origin).dim()
        );
    }

    if store.has_module_catalog() {
        println!();
        println!("{}", style("Modules").cyan().bold());
        for module in modules {
            println!("  {}", module);
        }
    }
    Ok(())
}
