//! Worker execution errors.
//!
//! Every variant except the oversized-output case (which is not an error,
//! see `WorkerOutcome::Oversized`) is fatal to the whole run: a broken
//! worker configuration must not silently degrade into bad reviews.

/// Errors produced while resolving or running verification workers.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {0} is configured in the run order but has no command template")]
    Undefined(String),

    #[error("worker {name} has an empty command template")]
    EmptyTemplate { name: String },

    #[error("failed to start worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {name} was terminated by a signal")]
    Signalled { name: String },

    #[error("worker {name} exited with code {code}")]
    Exited { name: String, code: i32 },

    #[error("worker {name} emitted unparseable output: {detail}")]
    Output { name: String, detail: String },

    #[error("worker {name} emitted an invite field that is not a sequence of identities")]
    InviteShape { name: String },
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_worker_display() {
        let err = WorkerError::Undefined("linty".to_string());
        assert!(err.to_string().contains("linty"));
        assert!(err.to_string().contains("no command template"));
    }

    #[test]
    fn test_exited_display() {
        let err = WorkerError::Exited {
            name: "linty".to_string(),
            code: 3,
        };
        assert!(err.to_string().contains("code 3"));
    }
}
