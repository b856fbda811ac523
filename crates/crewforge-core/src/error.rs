use thiserror::Error;

use crate::records::{Platform, RecordId};

/// Typed failures while resolving records into a runnable crew
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("crew has no tasks to run")]
    NoTasks,

    #[error("task {0} has no agent and the crew has none to fall back on")]
    NoAgentForTask(String),

    #[error("agent '{0}' has no chat model")]
    MissingLlm(String),

    #[error("{platform} credential {credential} is missing `{field}`")]
    MissingCredentialField {
        credential: RecordId,
        platform: Platform,
        field: &'static str,
    },

    #[error("{0} process is not supported")]
    UnsupportedProcess(String),
}
