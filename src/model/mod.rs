//! Reference decoder used by the command-line tool and end-to-end tests.

pub mod bigram;
pub mod cache;
pub mod config;

pub use bigram::BigramModel;
pub use cache::TokenCache;
pub use config::ModelFile;
