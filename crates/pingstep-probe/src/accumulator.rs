//! Folds the line-by-line output of one probe into a single outcome.

use crate::classifier::{LineClass, PatternTable};
use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use pingstep_model::{ProbeConfig, ProbeResult, RttStats};
use std::io::BufRead;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorState {
    Collecting,
    Completed(ProbeResult),
    Lost,
    Unparsable,
}

impl AccumulatorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AccumulatorState::Collecting)
    }

    pub fn into_result(self) -> Result<ProbeResult, ProbeError> {
        match self {
            AccumulatorState::Completed(result) => Ok(result),
            AccumulatorState::Lost => Err(ProbeError::PacketLoss),
            AccumulatorState::Collecting | AccumulatorState::Unparsable => {
                Err(ProbeError::UnparsableResponse)
            }
        }
    }
}

/// State machine for one probe. A reply line only updates the working
/// fields; the probe completes on a time-exceeded line, a summary line, or
/// is lost on the all-packets-lost line. The first terminal line wins.
#[derive(Debug)]
pub struct ResponseAccumulator<'a> {
    config: &'a ProbeConfig,
    table: &'static PatternTable,
    started_at: DateTime<Utc>,
    captured_at: DateTime<Utc>,
    hostname: Option<String>,
    address: Option<String>,
    latency_ms: u64,
    state: AccumulatorState,
}

impl<'a> ResponseAccumulator<'a> {
    /// `captured_at` is when the output became available; the time-exceeded
    /// case reports `captured_at - started_at` as its latency.
    pub fn new(
        config: &'a ProbeConfig,
        started_at: DateTime<Utc>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            config,
            table: PatternTable::global(),
            started_at,
            captured_at,
            hostname: None,
            address: None,
            latency_ms: elapsed_ms(started_at, captured_at),
            state: AccumulatorState::Collecting,
        }
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Feeds one line and reports whether the accumulator is now terminal.
    pub fn feed(&mut self, line: &str) -> bool {
        if self.state.is_terminal() {
            debug!(line, "ignoring line after terminal state");
            return true;
        }

        let class = self.table.classify(line);
        debug!(line, ?class, "classified ping line");

        match class {
            LineClass::TtlExceeded { hostname, address } => {
                self.hostname = hostname;
                self.address = Some(address);
                self.latency_ms = elapsed_ms(self.started_at, self.captured_at);
                self.complete(None);
            }
            LineClass::Success {
                hostname,
                address,
                latency_ms,
            } => {
                self.hostname = hostname;
                self.address = Some(address);
                self.latency_ms = whole_ms(latency_ms);
            }
            LineClass::RttSummary(stats) => {
                self.latency_ms = whole_ms(stats.avg);
                self.complete(Some(stats));
            }
            LineClass::Timeout => self.state = AccumulatorState::Lost,
            LineClass::NoMatch => {}
        }

        self.state.is_terminal()
    }

    /// Ends the input. Still collecting at this point means no terminal line
    /// was ever seen.
    pub fn finish(self) -> AccumulatorState {
        match self.state {
            AccumulatorState::Collecting => AccumulatorState::Unparsable,
            state => state,
        }
    }

    fn complete(&mut self, rtt: Option<RttStats>) {
        self.state = AccumulatorState::Completed(ProbeResult {
            start_time: self.started_at,
            end_time: self.captured_at,
            config: self.config.clone(),
            hostname: self.hostname.take(),
            address: self.address.take(),
            latency_ms: self.latency_ms,
            ttl_at_response: self.config.ttl,
            rtt,
        });
    }
}

/// Reads `reader` to the first terminal line. Bytes that are not valid UTF-8
/// are replaced rather than treated as a read failure.
pub fn parse_ping_output<R: BufRead>(
    mut reader: R,
    config: &ProbeConfig,
    started_at: DateTime<Utc>,
) -> Result<ProbeResult, ProbeError> {
    let mut accumulator = ResponseAccumulator::new(config, started_at, Utc::now());
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).map_err(ProbeError::Read)?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if accumulator.feed(line.trim_end_matches(['\n', '\r'])) {
            break;
        }
    }

    accumulator.finish().into_result()
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

fn whole_ms(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}
