use super::types::CachesnakeError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    /// Scoped to a single probe. The scan carries on and the probe counts as inconclusive.
    pub transient: bool,
}

impl CachesnakeError {
    /// Classify this error to determine its type and whether it only spoils one probe.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Per-probe failures
            CachesnakeError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                transient: true,
            },
            CachesnakeError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                transient: true,
            },
            CachesnakeError::Protocol(_) => ErrorClassification {
                error_type: "ProtocolError",
                transient: true,
            },
            CachesnakeError::Http(e) => ErrorClassification {
                error_type: if e.is_timeout() { "TimeoutError" } else { "HttpError" },
                transient: true,
            },
            CachesnakeError::Notification(_) => ErrorClassification {
                error_type: "NotificationError",
                transient: true,
            },

            // Run-level failures
            CachesnakeError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                transient: false,
            },
            CachesnakeError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                transient: false,
            },
            CachesnakeError::Catalogue(_) => ErrorClassification {
                error_type: "CatalogueError",
                transient: false,
            },
            CachesnakeError::Io(_) => ErrorClassification {
                error_type: "IoError",
                transient: false,
            },
            CachesnakeError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                transient: false,
            },
            CachesnakeError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                transient: false,
            },
        }
    }

    /// Process exit code used by the CLI when this error aborts a run.
    pub fn exit_code(&self) -> i32 {
        match self {
            CachesnakeError::Config(_) | CachesnakeError::Yaml(_) => 2,
            CachesnakeError::Catalogue(_) => 3,
            CachesnakeError::InvalidTarget(_) => 5,
            _ => 1,
        }
    }
}
