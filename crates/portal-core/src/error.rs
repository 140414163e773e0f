use thiserror::Error;

/// Rejections raised by the status transition logic.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action} while {state}")]
    IllegalTransition { action: &'static str, state: String },
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn illegal(action: &'static str, state: impl ToString) -> Self {
        Self::IllegalTransition {
            action,
            state: state.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} was modified concurrently; reload and retry")]
    Conflict(&'static str),
    #[error("{0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
