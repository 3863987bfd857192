use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to acquire lock within timeout!")]
    AcquireTimeout,

    #[error("Lock acquisition on {0} was interrupted")]
    Interrupted(String),

    #[error(transparent)]
    Lock(#[from] lockpick_core::Error),
}

impl Error {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Lock(err) => err.exit_code(),
            Self::Config(_) | Self::AcquireTimeout | Self::Interrupted(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
