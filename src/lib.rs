pub mod cli;
pub mod engine;
pub mod error;
pub mod model;
pub mod tensor;
pub mod tokenizer;

pub use engine::{
    Decoder, GenerationConfig, GenerationOutput, StopHandle, StopReason, TextRunner,
    TokenGenerator,
};
pub use error::InferenceError;
pub use model::{BigramModel, ModelFile};
pub use tokenizer::{TextCodec, Tokenizer, VocabTokenizer};
