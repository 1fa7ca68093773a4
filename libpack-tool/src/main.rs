use clap::Parser;
use libpack_lib::{Config, default_config};
use std::{collections::HashMap, env, fs, path::Path};

mod error;
mod fs_utils;
mod naming;
mod packaging;
mod process;

use crate::error::{PackError, PackResult};
use crate::process::{Plan, describe, parse_entry_arg, run};

#[derive(Parser, Debug)]
#[command(author, version, about = "Arduino library packager", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Library name; the archive is written as <name>.zip
    #[arg(short, long)]
    pub name: Option<String>,

    /// Staging directory (defaults to the library name)
    #[arg(short, long)]
    pub staging: Option<String>,

    /// Directory the archive is written to
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Patterns to skip while copying (can be specified multiple times)
    #[arg(long)]
    pub skip: Vec<String>,

    /// Store files without compression
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub store: bool,

    /// Remove the staging directory before copying
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub clean: bool,

    /// Dry run (just list copies and the archive path)
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub dry: bool,

    /// Generate YAML config to stdout
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub generate_yaml_config: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Source directories as SRC=DEST (replace the built-in list)
    #[arg()]
    pub entries: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = execute(&cli) {
        // Typed packaging errors carry their own exit code.
        let code = e.downcast_ref::<PackError>().map_or(1, PackError::exit_code);
        eprintln!("Error: {e:#}");
        std::process::exit(code);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: &Cli) -> anyhow::Result<()> {
    // Step 1: Read environment
    let env_config = read_env(env::vars());

    // Step 2: Read config file (if exists)
    let mut file_config = Config::default();
    if let Some(path) = cli.config.clone().or(env_config.config.clone()) {
        file_config = read_config_file(&path)?;
    }

    // Step 3: Merge configs: defaults < env < file < CLI
    let merged = merge_configs(
        default_config(),
        env_config,
        file_config,
        cli_to_config(cli)?,
    );

    if cli.generate_yaml_config {
        let yaml = serde_yaml::to_string(&merged)?;
        println!("{yaml}");
        return Ok(());
    }

    let plan = Plan::from_config(&merged)?;

    if plan.dry {
        println!("--- DRY RUN ---");
        println!("{}", serde_yaml::to_string(&merged)?);
        print!("{}", describe(&plan));
        return Ok(());
    }

    let archive = run(&plan)?;
    println!("Archive created: {}", archive.display());
    Ok(())
}

fn parse_bool(v: &str) -> bool {
    v == "true" || v == "1" || v.eq_ignore_ascii_case("yes")
}

/// Reads variables prefixed with LIBPACK_
fn read_env(vars: impl IntoIterator<Item = (String, String)>) -> Config {
    let mut cfg = Config::default();
    let vars: HashMap<String, String> = vars.into_iter().collect();

    macro_rules! get_env {
        ($key:expr) => {
            vars.get(&format!("LIBPACK_{}", $key)).cloned()
        };
    }

    cfg.config = get_env!("CONFIG");
    cfg.name = get_env!("NAME");
    cfg.staging = get_env!("STAGING");
    cfg.output_dir = get_env!("OUTPUT_DIR");
    cfg.compress = get_env!("COMPRESS").map(|v| parse_bool(&v));
    cfg.clean = get_env!("CLEAN").map(|v| parse_bool(&v));
    cfg.dry = get_env!("DRY").map(|v| parse_bool(&v));
    cfg.skip = get_env!("SKIP").map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });
    cfg
}

/// Reads YAML or JSON config from file
fn read_config_file(path: &str) -> PackResult<Config> {
    let config_err = |error: String| PackError::Config {
        path: Path::new(path).to_path_buf(),
        error,
    };
    let content = fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
    let lower = path.to_lowercase();
    let cfg = if lower.ends_with(".json") {
        serde_json::from_str(&content).map_err(|e| config_err(e.to_string()))?
    } else {
        serde_yaml::from_str(&content).map_err(|e| config_err(e.to_string()))?
    };
    Ok(cfg)
}

/// Converts CLI struct into Config. Flags that were not given stay unset so
/// they don't shadow lower layers.
fn cli_to_config(cli: &Cli) -> PackResult<Config> {
    let entries = if cli.entries.is_empty() {
        None
    } else {
        Some(
            cli.entries
                .iter()
                .map(|e| parse_entry_arg(e))
                .collect::<PackResult<Vec<_>>>()?,
        )
    };

    Ok(Config {
        name: cli.name.clone(),
        config: cli.config.clone(),
        staging: cli.staging.clone(),
        output_dir: cli.output_dir.clone(),
        entries,
        compress: cli.store.then_some(false),
        skip: if cli.skip.is_empty() {
            None
        } else {
            Some(cli.skip.clone())
        },
        clean: cli.clean.then_some(true),
        dry: cli.dry.then_some(true),
    })
}

/// Merge configs by priority: defaults < env < file < cli
fn merge_configs(defaults: Config, env: Config, file: Config, cli: Config) -> Config {
    fn pick<T>(defaults: Option<T>, env: Option<T>, file: Option<T>, cli: Option<T>) -> Option<T> {
        cli.or(file).or(env).or(defaults)
    }

    Config {
        name: pick(defaults.name, env.name, file.name, cli.name),
        config: pick(defaults.config, env.config, file.config, cli.config),
        staging: pick(defaults.staging, env.staging, file.staging, cli.staging),
        output_dir: pick(defaults.output_dir, env.output_dir, file.output_dir, cli.output_dir),
        entries: pick(defaults.entries, env.entries, file.entries, cli.entries),
        compress: pick(defaults.compress, env.compress, file.compress, cli.compress),
        skip: pick(defaults.skip, env.skip, file.skip, cli.skip),
        clean: pick(defaults.clean, env.clean, file.clean, cli.clean),
        dry: pick(defaults.dry, env.dry, file.dry, cli.dry),
    }
}
