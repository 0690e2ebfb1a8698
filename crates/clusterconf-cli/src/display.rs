//! Display formatting for CLI output
//!
//! Validation violations are grouped by file and document so a long
//! configuration stream stays readable.

use clusterconf_core::{DocumentViolations, MetaConfig, ValidationErrors};
use console::style;
use std::collections::BTreeMap;

/// A violation with the document it was found in
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub file: String,
    pub document: String,
    pub message: String,
}

/// Grouped validation results for display
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub checked_files: usize,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every violation of one file
    pub fn add_violations(&mut self, file: &str, errors: &ValidationErrors) {
        for document in &errors.documents {
            let label = document_label(document);
            for message in &document.messages {
                self.issues.push(ValidationIssue {
                    file: file.to_string(),
                    document: label.clone(),
                    message: message.clone(),
                });
            }
        }
    }

    /// Display errors grouped by file, then by document
    pub fn display(&self) {
        let mut by_file: BTreeMap<&str, BTreeMap<&str, Vec<&str>>> = BTreeMap::new();
        for issue in &self.issues {
            by_file
                .entry(&issue.file)
                .or_default()
                .entry(&issue.document)
                .or_default()
                .push(&issue.message);
        }

        for (file, documents) in by_file {
            println!();
            println!("{}", style(file).cyan().bold());

            for (document, messages) in documents {
                println!("  {} {}", style("→").blue(), style(document).yellow());
                for message in messages {
                    println!("    {} {}", style("✗").red(), message);
                }
            }
        }
    }

    /// Print summary line
    pub fn print_summary(&self) {
        if self.has_errors() {
            println!(
                "{} Validation failed: {} violation(s) in {} file(s)",
                style("✗").red().bold(),
                self.issues.len(),
                self.checked_files
            );
        } else {
            println!(
                "{} Validation passed for {} file(s)",
                style("✓").green().bold(),
                self.checked_files
            );
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }
}

fn document_label(document: &DocumentViolations) -> String {
    let api_version = if document.group.is_empty() {
        document.version.clone()
    } else {
        format!("{}/{}", document.group, document.version)
    };

    if document.name.is_empty() {
        format!("#{} {} {}", document.position, document.kind, api_version)
    } else {
        format!(
            "#{} {} {} ({})",
            document.position, document.kind, api_version, document.name
        )
    }
}

/// Print what a valid configuration stream describes
pub fn display_meta_summary(meta: &MetaConfig) {
    if !meta.cluster_type.is_empty() {
        println!("  {} Cluster type: {}", style("→").blue(), meta.cluster_type);
    }
    if !meta.provider_name.is_empty() {
        println!(
            "  {} Provider: {} (layout {})",
            style("→").blue(),
            meta.original_provider_name,
            meta.layout
        );
    }
    if !meta.cluster_dns_address.is_empty() {
        println!(
            "  {} Cluster DNS address: {}",
            style("→").blue(),
            meta.cluster_dns_address
        );
    }

    let modules: Vec<&str> = meta.module_configs.iter().map(|m| m.name.as_str()).collect();
    if !modules.is_empty() {
        println!(
            "  {} Module configs: {}",
            style("→").blue(),
            modules.join(", ")
        );
    }
    let resources: Vec<String> = meta
        .resources
        .iter()
        .map(|doc| {
            let kind = doc
                .schema_index()
                .map(|index| index.kind)
                .unwrap_or_default();
            match doc.name() {
                Some(name) => format!("{kind}/{name}"),
                None => kind,
            }
        })
        .collect();
    if resources.is_empty() {
        println!("  {} Resources: 0", style("→").blue());
    } else {
        println!(
            "  {} Resources: {} ({})",
            style("→").blue(),
            resources.len(),
            resources.join(", ")
        );
    }
}
