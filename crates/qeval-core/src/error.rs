use thiserror::Error;

#[derive(Debug, Error)]
pub enum QevalError {
    #[error("query failed ({status}): {message}")]
    Query { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

pub type QevalResult<T> = Result<T, QevalError>;
