use std::path::Path;

use jury_core::{EngineConfig, Problem};
use tracing::info;

pub fn load_config(path: Option<&str>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_file(Path::new(p)),
        None => Ok(EngineConfig::default()),
    }
}

pub fn run(
    input: &str,
    config: Option<&str>,
    output: Option<&str>,
    seed: Option<u64>,
    format: &str,
) -> anyhow::Result<()> {
    let problem = Problem::from_json_file(Path::new(input))?;
    info!(
        input,
        tasks = problem.tasks.len(),
        resources = problem.resources.len(),
        "loaded problem"
    );
    let mut config = load_config(config)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let outcome = jury_engine::run(&problem, &config)?;
    let json = serde_json::to_string_pretty(&outcome)?;

    if let Some(path) = output {
        std::fs::write(path, &json)?;
        eprintln!("✓ Wrote {} tasks to {path}", outcome.tasks.len());
    }

    match format {
        "json" if output.is_none() => println!("{json}"),
        "json" => {}
        _ => println!("{}", jury_engine::format_report(&outcome.stats)),
    }

    Ok(())
}
