use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid tuning: {0}")]
    InvalidTuning(String),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl From<core_playback::SourceError> for CoreError {
    fn from(err: core_playback::SourceError) -> Self {
        CoreError::Playback(err.into())
    }
}

impl From<core_playback::ResolveError> for CoreError {
    fn from(err: core_playback::ResolveError) -> Self {
        CoreError::Playback(err.into())
    }
}

impl From<core_playback::CacheError> for CoreError {
    fn from(err: core_playback::CacheError) -> Self {
        CoreError::Playback(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
