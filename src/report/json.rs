use super::types::RunReport;
use anyhow::{Context, Result};
use std::path::Path;

/// Generate JSON report
pub fn generate(report: &RunReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("JSON report saved to: {}", path.display());
    } else {
        println!("{}", json);
    }

    Ok(())
}
