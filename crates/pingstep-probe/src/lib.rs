//! Single-hop ICMP probing through the system `ping` tool.

pub mod accumulator;
pub mod classifier;
pub mod command;
pub mod error;
pub mod runner;

pub use accumulator::{parse_ping_output, AccumulatorState, ResponseAccumulator};
pub use classifier::{classify_line, LineClass, PatternKind, PatternTable};
pub use command::{ping_command_line, ProbeCommand, ProbeSettings};
pub use error::ProbeError;
pub use runner::{
    drain_diagnostics, is_execution_failure, probe, probe_with_executor, run_probes,
    run_probes_with_executor, PingExecutor, ProbeJobResult, ProcessOutput, SystemPingExecutor,
    MAX_DIAGNOSTIC_BYTES,
};
