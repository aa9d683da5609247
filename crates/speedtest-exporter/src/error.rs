use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// Which probe of a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    Latency,
    Download,
    Upload,
}

impl std::fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStage::Latency => write!(f, "latency"),
            ProbeStage::Download => write!(f, "download"),
            ProbeStage::Upload => write!(f, "upload"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("caller info discovery failed: {0}")]
    CallerInfo(#[source] Box<Error>),
    #[error("target list discovery failed: {0}")]
    TargetList(#[source] Box<Error>),
    #[error("no targets match the selection filter")]
    Selection,
    #[error("{stage} probe failed for server {server_id}: {source}")]
    Probe {
        stage: ProbeStage,
        server_id: String,
        #[source]
        source: Box<Error>,
    },
    #[error("{phase} timed out after {timeout_secs}s")]
    Timeout {
        phase: &'static str,
        timeout_secs: u64,
    },
    #[error("measurement pass cancelled")]
    Cancelled,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed server list: {0}")]
    ServerListDecode(#[from] serde_json::Error),
    #[error("malformed config document: {0}")]
    ConfigDecode(String),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    pub fn probe(stage: ProbeStage, server_id: impl Into<String>, source: Error) -> Self {
        Error::Probe {
            stage,
            server_id: server_id.into(),
            source: Box::new(source),
        }
    }

    /// Short phase tag used in failure logs.
    pub fn phase(&self) -> &'static str {
        match self {
            Error::CallerInfo(_) => "caller_info",
            Error::TargetList(_) => "target_list",
            Error::Selection => "selection",
            Error::Probe { .. } => "probe",
            Error::Timeout { phase, .. } => phase,
            Error::Cancelled => "cancelled",
            Error::Http(_) => "http",
            Error::ServerListDecode(_) | Error::ConfigDecode(_) => "decode",
            Error::Metrics(_) => "metrics",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_errors_carry_stage_and_target() {
        let err = Error::probe(ProbeStage::Upload, "1234", Error::Selection);
        assert_eq!(err.phase(), "probe");
        let msg = err.to_string();
        assert!(msg.contains("upload"), "{msg}");
        assert!(msg.contains("1234"), "{msg}");
    }

    #[test]
    fn timeout_names_its_phase() {
        let err = Error::Timeout {
            phase: "probe_run",
            timeout_secs: 60,
        };
        assert_eq!(err.phase(), "probe_run");
        assert!(err.to_string().contains("60"));
    }
}
