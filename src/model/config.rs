//! JSON model file for the reference bigram decoder.
//!
//! ```json
//! {
//!   "vocab": ["<unk>", "<s>", "</s>", "▁hello", "▁world"],
//!   "bos_id": 1,
//!   "eos_id": 2,
//!   "max_seq_len": 64,
//!   "logits": [[...], [...], [...], [...], [...]]
//! }
//! ```
//!
//! Row `i` of `logits` holds the next-token logits after token `i`, so the
//! table is `vocab.len()` by `vocab.len()`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::InferenceError;
use crate::tokenizer::VocabTokenizer;

/// Default maximum sequence length when the file does not set one.
pub const DEFAULT_MAX_SEQ_LEN: usize = 4096;

fn default_max_seq_len() -> usize {
    DEFAULT_MAX_SEQ_LEN
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub vocab: Vec<String>,
    #[serde(default)]
    pub bos_id: Option<u32>,
    #[serde(default)]
    pub eos_id: Option<u32>,
    #[serde(default)]
    pub pad_id: Option<u32>,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    pub logits: Vec<Vec<f32>>,
}

impl ModelFile {
    /// Load and validate a model file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model file");
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, InferenceError> {
        let file: ModelFile = serde_json::from_str(text)?;
        file.validate()?;
        info!(
            vocab_size = file.vocab_size(),
            max_seq_len = file.max_seq_len,
            bos_id = ?file.bos_id,
            eos_id = ?file.eos_id,
            "model file loaded"
        );
        Ok(file)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Check table dimensions and special token ids.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let v = self.vocab.len();
        if v == 0 {
            return Err(InferenceError::Model("vocabulary is empty".to_string()));
        }
        if self.logits.len() != v {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![v, v],
                actual: vec![self.logits.len()],
            });
        }
        if let Some((row, bad)) = self.logits.iter().enumerate().find(|(_, r)| r.len() != v) {
            return Err(InferenceError::Model(format!(
                "logits row {} has {} entries, expected {}",
                row,
                bad.len(),
                v
            )));
        }
        for (name, id) in [("bos_id", self.bos_id), ("eos_id", self.eos_id), ("pad_id", self.pad_id)] {
            if let Some(id) = id {
                if id as usize >= v {
                    return Err(InferenceError::Model(format!(
                        "{} {} out of range (vocab_size={})",
                        name, id, v
                    )));
                }
            }
        }
        if self.max_seq_len == 0 {
            return Err(InferenceError::Model("max_seq_len must be positive".to_string()));
        }
        Ok(())
    }

    /// Build the tokenizer described by this file's vocabulary.
    pub fn tokenizer(&self, add_bos: bool) -> VocabTokenizer {
        VocabTokenizer::new(
            self.vocab.clone(),
            self.bos_id,
            self.eos_id,
            self.pad_id,
            add_bos,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use std::io::Write;

    const TINY: &str = r#"{
        "vocab": ["<unk>", "<s>", "</s>"],
        "bos_id": 1,
        "eos_id": 2,
        "logits": [[0, 0, 1], [0, 0, 1], [0, 0, 1]]
    }"#;

    #[test]
    fn test_parse_defaults() {
        let file = ModelFile::from_json_str(TINY).unwrap();
        assert_eq!(file.vocab_size(), 3);
        assert_eq!(file.max_seq_len, DEFAULT_MAX_SEQ_LEN);
        assert_eq!(file.pad_id, None);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(TINY.as_bytes()).unwrap();

        let file = ModelFile::from_json_file(&path).unwrap();
        assert_eq!(file.eos_id, Some(2));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = ModelFile::from_json_file("/nonexistent/model.json");
        assert!(matches!(result, Err(InferenceError::Io(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = ModelFile::from_json_str("{ not json");
        assert!(matches!(result, Err(InferenceError::Json(_))));
    }

    #[test]
    fn test_row_count_mismatch() {
        let text = r#"{"vocab": ["a", "b"], "logits": [[0, 0]]}"#;
        let result = ModelFile::from_json_str(text);
        assert!(matches!(result, Err(InferenceError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_row_width_mismatch() {
        let text = r#"{"vocab": ["a", "b"], "logits": [[0, 0], [0]]}"#;
        let err = ModelFile::from_json_str(text).unwrap_err();
        assert!(err.to_string().contains("row 1"), "Error: {}", err);
    }

    #[test]
    fn test_special_id_out_of_range() {
        let text = r#"{"vocab": ["a"], "eos_id": 5, "logits": [[0]]}"#;
        let err = ModelFile::from_json_str(text).unwrap_err();
        assert!(err.to_string().contains("eos_id 5"), "Error: {}", err);
    }

    #[test]
    fn test_empty_vocab() {
        let text = r#"{"vocab": [], "logits": []}"#;
        assert!(ModelFile::from_json_str(text).is_err());
    }

    #[test]
    fn test_tokenizer_uses_special_ids() {
        let file = ModelFile::from_json_str(TINY).unwrap();
        let tok = file.tokenizer(true);
        assert_eq!(tok.bos_token_id(), Some(1));
        assert_eq!(tok.eos_token_id(), Some(2));
        assert_eq!(tok.encode("", true), vec![1]);
    }
}
