//! Offline tool for grid index files.
//!
//! `build` indexes series keys (`measurement,key=value,...` one per line) and compacts them
//! into an index file; `inspect` restores an index file and prints what it holds.
//!
//! Configuration is layered (in precedence order): defaults, config file (`--config` or
//! `tsgrid.toml`), environment variables (`TSGRID__*`), and CLI flags.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::{Config, Environment, File as ConfigFile};
use tsgrid::telemetry::index_metrics;
use tsgrid::{
    Index, IndexConfig, IndexEvent, IndexEventListener, IndexFile, MultiplierOptimizer, Tags,
};

// ---------- CLI ----------

/// Build and inspect grid index files.
#[derive(Parser, Debug)]
#[command(name = "tsgrid", version, about)]
pub struct Cli {
    /// Path to config file (TOML). If omitted, `tsgrid.toml` is loaded when present.
    #[arg(long, env = "TSGRID_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Do not load any config file; use defaults + env + CLI only.
    #[arg(long, default_value_t = false, global = true)]
    pub no_config: bool,

    /// Override the directory index files are written to.
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Override the optimizer's base dimension capacity.
    #[arg(long, global = true)]
    pub basic_num: Option<u64>,

    /// Override the optimizer's growth factor per saturated grid.
    #[arg(long, global = true)]
    pub multiplier: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Index series keys and write them as one index file.
    Build {
        /// Input file with one `measurement,key=value,...` per line; `-` reads stdin.
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Id used in the output file name.
        #[arg(long, default_value_t = 1)]
        file_id: u64,
    },
    /// Print the measurements, tag keys and series counts of an index file.
    Inspect {
        path: PathBuf,

        /// Also list the values of every tag key.
        #[arg(long, default_value_t = false)]
        values: bool,
    },
}

// ---------- File/env config (all optional for partial config) ----------

#[derive(Debug, Default, serde::Deserialize)]
pub struct OptimizerFileConfig {
    pub basic_num: Option<u64>,
    pub multiplier: Option<u64>,
}

/// Top-level config as read from file + env. Every field optional for layering.
#[derive(Debug, Default, serde::Deserialize)]
pub struct TsgridFileConfig {
    pub index_dir: Option<String>,
    pub compaction_level: Option<u32>,
    pub optimizer: Option<OptimizerFileConfig>,
}

/// Load merged config. CLI overrides file/env.
fn load_config(cli: &Cli) -> Result<IndexConfig, String> {
    let mut builder = Config::builder();

    if !cli.no_config {
        if let Some(ref path) = cli.config {
            if !path.exists() {
                return Err(format!("config file not found: {}", path.display()));
            }
            builder = builder.add_source(ConfigFile::from(path.as_path()).required(false));
        } else {
            let default_path = PathBuf::from("tsgrid.toml");
            if default_path.exists() {
                builder = builder.add_source(ConfigFile::from(default_path.as_path()).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("TSGRID")
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true),
    );

    let merged = builder.build().map_err(|e| e.to_string())?;
    let partial: TsgridFileConfig = merged.try_deserialize().map_err(|e| e.to_string())?;

    let mut index_config = IndexConfig {
        event_listener: Arc::new(StderrEventListener),
        ..IndexConfig::default()
    };
    if let Some(d) = &partial.index_dir {
        index_config.dir = PathBuf::from(d);
    }
    if let Some(level) = partial.compaction_level {
        index_config.compaction_level = level;
    }

    let file_opt = partial.optimizer.unwrap_or_default();
    let defaults = MultiplierOptimizer::default();
    let basic_num = cli
        .basic_num
        .or(file_opt.basic_num)
        .unwrap_or(defaults.basic_num());
    let multiplier = cli
        .multiplier
        .or(file_opt.multiplier)
        .unwrap_or(defaults.multiplier());
    index_config.optimizer =
        MultiplierOptimizer::new(basic_num, multiplier).map_err(|e| e.to_string())?;

    if let Some(ref d) = cli.index_dir {
        index_config.dir = d.clone();
    }
    Ok(index_config)
}

#[derive(Debug)]
struct StderrEventListener;

impl IndexEventListener for StderrEventListener {
    fn on_event(&self, event: IndexEvent) {
        match event {
            IndexEvent::IndexFileWritten {
                path,
                bytes,
                measurements,
            } => eprintln!(
                "wrote {} ({} bytes, {} measurements)",
                path.display(),
                bytes,
                measurements
            ),
            IndexEvent::IndexFileWriteFailed { error } => {
                eprintln!("index file write failed: {}", error)
            }
            IndexEvent::MeasurementCreated { .. } | IndexEvent::MeasurementDropped { .. } => {}
        }
    }
}

// ---------- Series key parsing ----------

/// Parses `measurement,key=value,...`. Blank lines and `#` comments yield `None`.
fn parse_series_line(line: &str) -> Result<Option<(String, Tags)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.split(',');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(format!("missing measurement name in {:?}", line));
    }
    let mut tags = Tags::new();
    for pair in parts {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| format!("tag {:?} is not key=value", pair))?;
        if k.is_empty() {
            return Err(format!("empty tag key in {:?}", line));
        }
        tags.set(k, v);
    }
    Ok(Some((name.to_string(), tags)))
}

fn read_series(input: &PathBuf) -> Result<Vec<(String, Tags)>, Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if input.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    let mut series = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        if let Some(s) = parse_series_line(&line?).map_err(|e| format!("line {}: {}", n + 1, e))? {
            series.push(s);
        }
    }
    Ok(series)
}

// ---------- Commands ----------

fn build(
    index_config: IndexConfig,
    input: &PathBuf,
    file_id: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let series = read_series(input)?;
    let index = Index::open(index_config)?;
    let ids = index.create_series_list_if_not_exists(&series)?;
    let mut distinct = ids.clone();
    distinct.sort_unstable();
    distinct.dedup();
    eprintln!(
        "indexed {} series keys ({} distinct) across {} measurements",
        ids.len(),
        distinct.len(),
        index.measurement_names()?.len()
    );
    let path = index.compact(file_id)?;
    println!("{}", path.display());
    Ok(())
}

fn inspect(path: &PathBuf, values: bool) -> Result<(), Box<dyn std::error::Error>> {
    let file = IndexFile::open(path)?;
    println!("{} ({} bytes)", path.display(), file.size());
    for name in file.measurement_names()? {
        let Some(elem) = file.measurement(&name)? else {
            continue;
        };
        println!(
            "{} id={} series={} grids={}",
            name,
            elem.measurement_id(),
            elem.series_n(),
            elem.grids().len()
        );
        for key in file.tag_keys(&name)? {
            if values {
                let vs: Vec<String> = file.tag_values(&name, &key)?.collect();
                println!("  {} = [{}]", key, vs.join(", "));
            } else {
                println!("  {}", key);
            }
        }
    }
    Ok(())
}

// ---------- Main ----------

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    index_metrics::describe();
    match &cli.command {
        Command::Build { input, file_id } => {
            let index_config = load_config(&cli).map_err(|e| {
                eprintln!("config error: {}", e);
                e
            })?;
            build(index_config, input, *file_id)
        }
        Command::Inspect { path, values } => inspect(path, *values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_series_lines() {
        let (name, tags) = parse_series_line("cpu,host=a,region=eu").unwrap().unwrap();
        assert_eq!(name, "cpu");
        assert_eq!(tags.to_string(), "host=a,region=eu");
        assert!(parse_series_line("  # comment").unwrap().is_none());
        assert!(parse_series_line("").unwrap().is_none());
        assert!(parse_series_line("cpu,host").is_err());
        assert!(parse_series_line(",host=a").is_err());
    }

    #[test]
    fn measurement_without_tags_is_allowed() {
        let (name, tags) = parse_series_line("uptime").unwrap().unwrap();
        assert_eq!(name, "uptime");
        assert!(tags.is_empty());
    }
}
