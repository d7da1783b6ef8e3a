//! Output formatting

use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use stratum_core::ProvenanceEntry;

pub fn print_json(value: &Value, compact: bool) -> serde_json::Result<()> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{text}");
    Ok(())
}

/// One line per value: `path = value  (file)`
///
/// Files inside `project` are shown relative to it.
pub fn print_trace(entries: &[ProvenanceEntry], project: &Path) {
    let project = stratum_core::fs::absolute_path(project).unwrap_or_else(|_| project.to_path_buf());

    for entry in entries {
        let origin = match &entry.source_file_path {
            Some(file) => file
                .strip_prefix(&project)
                .unwrap_or(file)
                .display()
                .to_string(),
            None => "<merged>".to_string(),
        };

        let mut line = format!(
            "{} = {}  {}",
            entry.path.cyan(),
            entry.value,
            format!("({origin})").dimmed()
        );
        if let Some(original) = &entry.original_value {
            if original != &entry.value {
                line.push_str(&format!(" {}", format!("was {original}").yellow()));
            }
        }
        println!("{line}");
    }
}
