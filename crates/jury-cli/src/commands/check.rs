use std::path::Path;

use jury_core::Task;
use jury_engine::Violation;
use serde::Deserialize;

/// Accepts both outcome and problem JSON; only `tasks` is read.
#[derive(Deserialize)]
struct Tasks {
    tasks: Vec<Task>,
}

fn audit_file(path: &Path) -> anyhow::Result<(usize, Vec<Violation>)> {
    let content = std::fs::read_to_string(path)?;
    let Tasks { tasks } = serde_json::from_str(&content)?;
    Ok((tasks.len(), jury_engine::audit(&tasks)))
}

pub fn check(input: &str) -> anyhow::Result<()> {
    let (count, violations) = audit_file(Path::new(input))?;

    if violations.is_empty() {
        println!("✓ {count} tasks pass the audit");
        return Ok(());
    }

    println!("❌ {} violations in {count} tasks:\n", violations.len());
    for v in &violations {
        println!("  • {v}");
    }
    anyhow::bail!("audit failed")
}
