use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use layercheck::{init_logging, simulate, Config, BUILD_DATE, VERSION};
use tracing::{info, warn};

const USAGE: &str = "Usage: layercheck <toolpath.gcode> [config.toml|config.json]";

fn main() -> anyhow::Result<ExitCode> {
    init_logging()?;

    let mut args = std::env::args().skip(1);
    let toolpath = args.next().map(PathBuf::from);
    let config_path = args.next().map(PathBuf::from);
    if matches!(toolpath.as_deref().and_then(|p| p.to_str()), Some("-h" | "--help")) {
        println!("layercheck {} (built {})\n{}", VERSION, BUILD_DATE, USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = load_config(config_path)?;
    if let Some(toolpath) = toolpath {
        config.toolpath.source = Some(toolpath);
    }
    if config.toolpath.source.is_none() {
        eprintln!("{}", USAGE);
    }

    let summary = simulate(&config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.is_stable() {
        info!("All {} layers are stable", summary.layers);
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("Unstable layers: {:?}", summary.failed_layers);
        Ok(ExitCode::FAILURE)
    }
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        return Config::load_from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    match Config::default_path().filter(|path| path.exists()) {
        Some(path) => Config::load_from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}
