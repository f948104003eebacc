use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pingstep_model::{ProbeConfig, ProbeFile, ProbeRecord, ProbeResult, ProbeStatus, MAX_TTL};
use pingstep_probe::{parse_ping_output, ping_command_line, run_probes, ProbeError, ProbeSettings};
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pingstep", version, about = "Single-packet, TTL-limited ping probes")]
struct Cli {
    /// Log at debug level, including every classified output line.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Probe(ProbeArgs),
    Parse(ParseArgs),
    Command(CommandArgs),
}

#[derive(Args)]
#[command(
    about = "Send one TTL-limited ping per target. Only target networks you own or have permission to test."
)]
struct ProbeArgs {
    #[arg(long)]
    targets: Option<PathBuf>,

    #[arg(long = "target", num_args = 1..)]
    target_list: Vec<String>,

    #[arg(long, value_parser = parse_ttl)]
    ttl: u32,

    #[arg(long, value_parser = parse_timeout_secs)]
    timeout_secs: Option<u64>,

    #[arg(long, default_value = "ping")]
    program: String,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
#[command(about = "Classify captured ping output (file or stdin) as if it came from a probe")]
struct ParseArgs {
    #[arg(long)]
    target: String,

    #[arg(long, value_parser = parse_ttl)]
    ttl: u32,

    #[arg(long = "in")]
    in_path: Option<PathBuf>,
}

#[derive(Args)]
#[command(about = "Print the ping command line a probe would run")]
struct CommandArgs {
    #[arg(long)]
    target: String,

    #[arg(long, value_parser = parse_ttl)]
    ttl: u32,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Probe(args) => run_probe(args),
        Commands::Parse(args) => run_parse(args),
        Commands::Command(args) => run_command(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_ttl(value: &str) -> Result<u32, String> {
    let ttl: u32 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;
    if ttl == 0 || ttl > MAX_TTL {
        return Err(format!("ttl must be between 1 and {MAX_TTL}"));
    }
    Ok(ttl)
}

fn parse_timeout_secs(value: &str) -> Result<u64, String> {
    let secs: u64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a whole number"))?;
    if secs == 0 {
        return Err("timeout must be at least 1 second".to_string());
    }
    Ok(secs)
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    let mut targets = match &args.targets {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read targets file {:?}", path))?;
            parse_targets(&contents)
        }
        None => Vec::new(),
    };
    targets.extend(args.target_list);

    if targets.is_empty() {
        return Err(anyhow!("no targets provided (use --targets or --target)"));
    }

    let configs = targets
        .iter()
        .map(|target| {
            ProbeConfig::new(target.as_str(), args.ttl)
                .with_context(|| format!("invalid target {target:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let settings = ProbeSettings {
        program: args.program,
        timeout_secs: args.timeout_secs,
    };

    info!(probes = configs.len(), ttl = args.ttl, "starting probes");
    let records: Vec<ProbeRecord> = run_probes(&configs, &settings, args.concurrency)
        .into_iter()
        .map(|job| to_record(&job.config, job.outcome))
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        writeln!(out, "{}", summary_line(record))?;
    }

    if let Some(path) = &args.out {
        write_json(
            path,
            &ProbeFile {
                version: 1,
                records,
            },
        )?;
        info!(path = ?path, "wrote probe report");
    }

    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<()> {
    let config = ProbeConfig::new(args.target, args.ttl).context("invalid probe config")?;
    let started_at = Utc::now();

    let outcome = match &args.in_path {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("failed to open transcript {:?}", path))?;
            parse_ping_output(BufReader::new(file), &config, started_at)
        }
        None => parse_ping_output(io::stdin().lock(), &config, started_at),
    };

    let record = to_record(&config, outcome);
    let json = serde_json::to_string_pretty(&record)?;
    println!("{json}");
    Ok(())
}

fn run_command(args: CommandArgs) -> Result<()> {
    let config = ProbeConfig::new(args.target, args.ttl).context("invalid probe config")?;
    println!("{}", ping_command_line(&config.target, config.ttl));
    Ok(())
}

fn parse_targets(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn to_record(config: &ProbeConfig, outcome: Result<ProbeResult, ProbeError>) -> ProbeRecord {
    let (status, result, error) = match outcome {
        Ok(result) => (ProbeStatus::Completed, Some(result), None),
        Err(err) => {
            let status = match &err {
                ProbeError::PacketLoss => ProbeStatus::PacketLoss,
                ProbeError::UnparsableResponse => ProbeStatus::Unparsable,
                ProbeError::ExecutionFailure { .. } => ProbeStatus::ExecutionFailure,
                ProbeError::InvalidConfig(_) | ProbeError::Spawn { .. } | ProbeError::Read(_) => {
                    ProbeStatus::Error
                }
            };
            warn!(host = %config.target, ttl = config.ttl, kind = err.kind(), "{err}");
            (status, None, Some(err.to_string()))
        }
    };

    ProbeRecord {
        target: config.target.clone(),
        ttl: config.ttl,
        status,
        result,
        error,
    }
}

fn summary_line(record: &ProbeRecord) -> String {
    let head = format!("{} ttl={}", record.target, record.ttl);
    match (&record.result, &record.error) {
        (Some(result), _) => {
            let address = result.address.as_deref().unwrap_or("?");
            let peer = match &result.hostname {
                Some(hostname) if hostname != address => format!("{hostname} ({address})"),
                _ => address.to_string(),
            };
            format!("{head} reply from {peer} in {} ms", result.latency_ms)
        }
        (None, Some(error)) => format!("{head} {error}"),
        (None, None) => format!("{head} no result"),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {:?}", parent))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create temp file {:?}", tmp_path))?;
    file.write_all(data)
        .with_context(|| format!("failed to write temp file {:?}", tmp_path))?;
    file.sync_all()
        .with_context(|| format!("failed to sync temp file {:?}", tmp_path))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("failed to replace output {:?}: {}", path, err));
    }

    // Persist the rename itself, not just the file contents.
    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    parent.join(format!(".{}.part-{}-{}", file_name, std::process::id(), stamp))
}
