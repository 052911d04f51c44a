use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("unknown agent: {id}")]
    UnknownAgent { id: String },

    #[error("agent {id} is unavailable: {detail}")]
    Unavailable { id: String, detail: String },
}
