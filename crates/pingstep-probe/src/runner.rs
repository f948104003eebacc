use crate::accumulator::parse_ping_output;
use crate::command::{ProbeCommand, ProbeSettings};
use crate::error::ProbeError;
use chrono::Utc;
use pingstep_model::{ProbeConfig, ProbeResult};
use std::io::{self, BufRead, Read};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Upper bound on how much of the diagnostic stream ends up in an error.
pub const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// Captured result of running the ping tool to completion.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs a probe command. The process is expected to have exited when this
/// returns; bounding how long that takes is up to the implementation.
pub trait PingExecutor {
    fn execute(&self, command: &ProbeCommand) -> io::Result<ProcessOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPingExecutor;

impl PingExecutor for SystemPingExecutor {
    fn execute(&self, command: &ProbeCommand) -> io::Result<ProcessOutput> {
        let output = command.to_command().stdin(Stdio::null()).output()?;
        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[derive(Debug)]
pub struct ProbeJobResult {
    pub config: ProbeConfig,
    pub outcome: Result<ProbeResult, ProbeError>,
}

/// ping exits 1 when no reply came back, which includes the time-exceeded
/// case, so only 2 and above (or a signal) count as a failed execution.
pub fn is_execution_failure(status: Option<i32>) -> bool {
    !matches!(status, Some(0) | Some(1))
}

/// Reads the diagnostic stream up to `limit` bytes, joining lines with a
/// space. A read error keeps whatever was collected before it; so does
/// hitting the cap.
pub fn drain_diagnostics<R: BufRead>(reader: R, limit: usize) -> String {
    let (message, truncated) = drain_bounded(reader, limit);
    if truncated {
        warn!(limit, "diagnostic stream exceeded cap, message truncated");
    }
    message
}

fn drain_bounded<R: BufRead>(reader: R, limit: usize) -> (String, bool) {
    let mut reader = reader.take(limit as u64);
    let mut message = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => push_line(&mut message, &buf),
            Err(err) => {
                warn!(error = %err, "diagnostic stream read failed, keeping partial message");
                push_line(&mut message, &buf);
                return (message, false);
            }
        }
    }

    let truncated = reader.limit() == 0
        && reader
            .into_inner()
            .fill_buf()
            .map(|rest| !rest.is_empty())
            .unwrap_or(false);
    (message, truncated)
}

fn push_line(message: &mut String, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if !message.is_empty() {
        message.push(' ');
    }
    message.push_str(line);
}

pub fn probe(config: &ProbeConfig, settings: &ProbeSettings) -> Result<ProbeResult, ProbeError> {
    probe_with_executor(config, settings, &SystemPingExecutor)
}

/// Runs one probe. The config is checked before anything is spawned, and a
/// failed execution is reported from the diagnostic stream before any output
/// line is classified.
pub fn probe_with_executor<E: PingExecutor + ?Sized>(
    config: &ProbeConfig,
    settings: &ProbeSettings,
    executor: &E,
) -> Result<ProbeResult, ProbeError> {
    config.validate()?;
    let command = ProbeCommand::new(&config.target, config.ttl, settings);
    info!(%command, "launching probe");

    let started_at = Utc::now();
    let output = executor
        .execute(&command)
        .map_err(|source| ProbeError::Spawn {
            program: command.program.clone(),
            source,
        })?;

    if is_execution_failure(output.status) {
        let message = drain_diagnostics(output.stderr.as_slice(), MAX_DIAGNOSTIC_BYTES);
        return Err(ProbeError::ExecutionFailure {
            status: output.status,
            message,
        });
    }

    parse_ping_output(output.stdout.as_slice(), config, started_at)
}

pub fn run_probes(
    configs: &[ProbeConfig],
    settings: &ProbeSettings,
    concurrency: usize,
) -> Vec<ProbeJobResult> {
    run_probes_with_executor(configs, settings, concurrency, Arc::new(SystemPingExecutor))
}

/// Runs independent probes on up to `concurrency` worker threads. Results
/// come back in the order of `configs`, whatever order they finish in.
pub fn run_probes_with_executor<E>(
    configs: &[ProbeConfig],
    settings: &ProbeSettings,
    concurrency: usize,
    executor: Arc<E>,
) -> Vec<ProbeJobResult>
where
    E: PingExecutor + Send + Sync + ?Sized,
{
    let workers = concurrency.clamp(1, configs.len().max(1));
    let next = AtomicUsize::new(0);
    debug!(jobs = configs.len(), workers, "running probes");

    let mut finished: Vec<(usize, ProbeJobResult)> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| {
                let mut done = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(config) = configs.get(index) else {
                        break;
                    };
                    let outcome = probe_with_executor(config, settings, &*executor);
                    if let Err(err) = &outcome {
                        debug!(host = %config.target, ttl = config.ttl, error = %err, "probe failed");
                    }
                    done.push((
                        index,
                        ProbeJobResult {
                            config: config.clone(),
                            outcome,
                        },
                    ));
                }
                done
            }));
        }

        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });

    finished.sort_by_key(|(index, _)| *index);
    finished.into_iter().map(|(_, job)| job).collect()
}
