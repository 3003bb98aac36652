use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Decode step failed: {0}")]
    DecodeStep(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model error: {0}")]
    Model(String),
}

impl InferenceError {
    /// Wrap an error raised by a decoder step, keeping `DecodeStep` as is.
    pub(crate) fn into_decode_step(self, pos: usize) -> Self {
        match self {
            e @ InferenceError::DecodeStep(_) => e,
            other => InferenceError::DecodeStep(format!("pos {}: {}", pos, other)),
        }
    }

    /// Wrap an error raised while decoding a token to text, keeping `Tokenizer` as is.
    pub(crate) fn into_tokenizer(self, token: u32) -> Self {
        match self {
            e @ InferenceError::Tokenizer(_) => e,
            other => InferenceError::Tokenizer(format!("token {}: {}", token, other)),
        }
    }
}
