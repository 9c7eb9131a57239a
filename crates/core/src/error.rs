use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown console channel code: {0}")]
    UnknownChannelCode(i64),

    #[error("Unknown output type: {0}")]
    UnknownOutputType(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
