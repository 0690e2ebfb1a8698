//! Validate command - parse configuration streams against the schema store

use clusterconf_core::{CoreError, MetaConfig, PreparatorRegistry, SchemaStore, ValidationErrors};
use console::style;
use std::path::PathBuf;

use crate::display::{ValidationReport, display_meta_summary};
use crate::error::{CliError, Result};

use super::{StoreArgs, read_file};

pub fn run(store_args: &StoreArgs, files: &[PathBuf], json_output: bool) -> Result<()> {
    let store = store_args.load_store()?;
    let preparators = PreparatorRegistry::new();

    let mut report = ValidationReport::new();
    let mut results = Vec::new();

    for file in files {
        let name = file.display().to_string();
        if !json_output {
            println!("{} Validating {}", style("→").blue(), name);
        }

        let text = read_file(file)?;
        let errors = match parse(&store, &text, &preparators)? {
            Ok(meta) => {
                if !json_output {
                    display_meta_summary(&meta);
                }
                ValidationErrors::default()
            }
            Err(errors) => errors,
        };

        report.checked_files += 1;
        report.add_violations(&name, &errors);
        results.push(serde_json::json!({
            "file": name,
            "valid": errors.is_empty(),
            "errors": errors.documents,
        }));
    }

    if json_output {
        let output = serde_json::json!({
            "valid": !report.has_errors(),
            "files": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        report.display();
        println!();
        report.print_summary();
    }

    if report.has_errors() {
        return Err(CliError::validation_with_help(
            format!("{} violation(s) found", report.issues.len()),
            "fix the listed fields; paths are JSON pointers into each document",
        ));
    }
    Ok(())
}

/// Structural violations are reported per file; anything else aborts the run
fn parse(
    store: &SchemaStore,
    text: &str,
    preparators: &PreparatorRegistry,
) -> Result<std::result::Result<MetaConfig, ValidationErrors>> {
    match MetaConfig::parse(store, text, preparators) {
        Ok(meta) => Ok(Ok(meta)),
        Err(CoreError::StructuralValidationFailed(errors)) => Ok(Err(errors)),
        Err(other) => Err(other.into()),
    }
}
