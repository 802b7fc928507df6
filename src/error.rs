pub type CompressResult<T> = Result<T, CompressError>;

#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("input error: {0}")]
    UserInput(String),

    #[error("engine initialization error: {0}")]
    EngineInitialization(String),

    #[error("engine not ready: {0}")]
    EngineNotReady(String),

    #[error("transcode failure: {0}")]
    Transcode(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CompressError {
    pub fn user_input(msg: impl Into<String>) -> Self {
        Self::UserInput(msg.into())
    }

    pub fn engine_initialization(msg: impl Into<String>) -> Self {
        Self::EngineInitialization(msg.into())
    }

    pub fn engine_not_ready(msg: impl Into<String>) -> Self {
        Self::EngineNotReady(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
