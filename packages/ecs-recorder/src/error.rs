//! Recorder error type. Wraps `ecs_core::EcsError` and adds I/O-shaped
//! variants, in the same per-variant `thiserror` style as `ecs-core`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error(transparent)]
    Ecs(#[from] ecs_core::EcsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("recorder writer thread panicked: {0}")]
    WriterPanicked(String),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type RecorderResult<T> = Result<T, RecorderError>;
