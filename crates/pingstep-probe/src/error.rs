use pingstep_model::ConfigError;
use thiserror::Error;

/// Why a probe produced no [`pingstep_model::ProbeResult`].
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read ping output: {0}")]
    Read(#[source] std::io::Error),

    #[error("ping exited with {}: {message}", status_label(.status))]
    ExecutionFailure { status: Option<i32>, message: String },

    #[error("packet lost")]
    PacketLoss,

    #[error("could not parse ping response")]
    UnparsableResponse,
}

impl ProbeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InvalidConfig(_) => "invalid_config",
            ProbeError::Spawn { .. } => "spawn",
            ProbeError::Read(_) => "read",
            ProbeError::ExecutionFailure { .. } => "execution_failure",
            ProbeError::PacketLoss => "packet_loss",
            ProbeError::UnparsableResponse => "unparsable",
        }
    }
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}
