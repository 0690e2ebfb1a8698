//! Check-changes command - compare a running configuration with a proposed one

use clusterconf_core::{OperationPhase, validate_cluster_settings_changes};
use console::style;
use std::path::Path;

use crate::error::Result;

use super::{StoreArgs, read_file};

pub fn run(store_args: &StoreArgs, old: &Path, new: &Path, phase: OperationPhase) -> Result<()> {
    let store = store_args.load_store()?;
    let old_text = read_file(old)?;
    let new_text = read_file(new)?;

    println!(
        "{} Checking changes {} -> {} (phase {})",
        style("→").blue(),
        old.display(),
        new.display(),
        phase
    );

    if phase.bypasses_change_safety() {
        println!(
            "  {} Phase {} accepts any configuration change",
            style("⚠").yellow(),
            phase
        );
    }

    validate_cluster_settings_changes(&store, phase, &old_text, &new_text)?;

    println!("{} Changes are safe to apply", style("✓").green().bold());
    Ok(())
}
