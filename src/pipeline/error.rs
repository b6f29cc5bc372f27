use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Worker task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}
