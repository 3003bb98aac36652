//! Tokenizer traits and incremental piece decoding.
//!
//! [`TextCodec`] is the narrow interface the generation loop streams through:
//! it maps a `(previous, current)` token pair to the text fragment that
//! `current` adds. Any [`Tokenizer`] can serve as a codec through
//! [`TokenizerCodec`].

pub mod vocab;

pub use vocab::VocabTokenizer;

use std::cell::RefCell;

use crate::error::InferenceError;

/// The SentencePiece word-boundary marker character.
pub(crate) const SPIECE_UNDERLINE: char = '\u{2581}';

/// Maps a token pair to the incremental text attributable to the second token.
pub trait TextCodec {
    fn decode_piece(&self, prev: u32, cur: u32) -> Result<String, InferenceError>;
}

/// A tokenizer that converts text to token IDs and back.
///
/// All implementations must be thread-safe (`Send + Sync`).
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token IDs.
    ///
    /// When `add_special_tokens` is true, the BOS token is prepended if the
    /// vocabulary defines one.
    fn encode(&self, text: &str, add_special_tokens: bool) -> Vec<u32>;

    /// Decode a sequence of token IDs back into text.
    fn decode(&self, ids: &[u32]) -> String;

    /// Return the total vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Raw vocabulary entry for `id`, if it exists.
    fn id_to_piece(&self, id: u32) -> Option<&str>;

    fn bos_token_id(&self) -> Option<u32>;

    fn eos_token_id(&self) -> Option<u32>;

    fn pad_token_id(&self) -> Option<u32>;

    /// Raw bytes contributed by `cur` when it follows `prev`.
    ///
    /// Special tokens contribute nothing, byte tokens `<0xNN>` their byte,
    /// and the word-boundary marker a space. A leading space is dropped
    /// right after BOS, so the first word of a reply is not indented.
    /// A byte token may carry only part of a multi-byte character.
    fn decode_piece_bytes(&self, prev: u32, cur: u32) -> Result<Vec<u8>, InferenceError> {
        let piece = self.id_to_piece(cur).ok_or_else(|| {
            InferenceError::Tokenizer(format!(
                "token id {} out of range (vocab_size={})",
                cur,
                self.vocab_size()
            ))
        })?;

        if Some(cur) == self.bos_token_id()
            || Some(cur) == self.eos_token_id()
            || Some(cur) == self.pad_token_id()
        {
            return Ok(Vec::new());
        }

        if let Some(byte) = parse_byte_token(piece) {
            return Ok(vec![byte]);
        }

        let text = piece.replace(SPIECE_UNDERLINE, " ");
        if Some(prev) == self.bos_token_id() {
            if let Some(stripped) = text.strip_prefix(' ') {
                return Ok(stripped.as_bytes().to_vec());
            }
        }
        Ok(text.into_bytes())
    }

    /// Text fragment produced by `cur` when it follows `prev`.
    ///
    /// Stateless: a byte token holding part of a multi-byte character
    /// decodes to U+FFFD. Streaming callers should go through
    /// [`TokenizerCodec`], which reassembles split characters.
    fn decode_piece(&self, prev: u32, cur: u32) -> Result<String, InferenceError> {
        self.decode_piece_bytes(prev, cur)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Parse a byte-fallback token of the form `<0xNN>`.
pub(crate) fn parse_byte_token(piece: &str) -> Option<u8> {
    if piece.len() == 6 && piece.starts_with("<0x") && piece.ends_with('>') {
        u8::from_str_radix(&piece[3..5], 16).ok()
    } else {
        None
    }
}

/// Adapter exposing a borrowed [`Tokenizer`] as a [`TextCodec`].
///
/// Bytes of a character split across byte tokens are held back until the
/// character is complete; invalid sequences are flushed as U+FFFD.
pub struct TokenizerCodec<'a> {
    tokenizer: &'a dyn Tokenizer,
    pending: RefCell<Vec<u8>>,
}

impl<'a> TokenizerCodec<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer) -> Self {
        Self {
            tokenizer,
            pending: RefCell::new(Vec::new()),
        }
    }

    /// Release bytes still waiting for the rest of their character.
    pub fn flush(&self) -> String {
        let mut pending = self.pending.borrow_mut();
        let text = String::from_utf8_lossy(&pending).into_owned();
        pending.clear();
        text
    }
}

impl TextCodec for TokenizerCodec<'_> {
    fn decode_piece(&self, prev: u32, cur: u32) -> Result<String, InferenceError> {
        let bytes = self.tokenizer.decode_piece_bytes(prev, cur)?;
        let mut pending = self.pending.borrow_mut();
        pending.extend_from_slice(&bytes);
        Ok(take_complete_utf8(&mut pending))
    }
}

/// Drain the longest decodable prefix of `pending`, keeping a truncated
/// trailing character for the next call.
fn take_complete_utf8(pending: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(pending.as_slice()) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_some() => pending.len(),
        Err(e) => e.valid_up_to(),
    };
    let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
    pending.drain(..valid);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal tokenizer for testing the provided methods.
    struct MockTokenizer {
        vocab: Vec<String>,
    }

    impl MockTokenizer {
        fn new() -> Self {
            Self {
                vocab: vec![
                    "<pad>".to_string(),        // 0
                    "<s>".to_string(),          // 1
                    "</s>".to_string(),         // 2
                    "\u{2581}hello".to_string(), // 3
                    "\u{2581}world".to_string(), // 4
                    "ing".to_string(),          // 5
                    "<0x0A>".to_string(),       // 6
                ],
            }
        }
    }

    impl Tokenizer for MockTokenizer {
        fn encode(&self, _text: &str, _add_special_tokens: bool) -> Vec<u32> {
            Vec::new()
        }

        fn decode(&self, ids: &[u32]) -> String {
            ids.iter()
                .filter_map(|&id| self.vocab.get(id as usize))
                .cloned()
                .collect()
        }

        fn vocab_size(&self) -> usize {
            self.vocab.len()
        }

        fn id_to_piece(&self, id: u32) -> Option<&str> {
            self.vocab.get(id as usize).map(String::as_str)
        }

        fn bos_token_id(&self) -> Option<u32> {
            Some(1)
        }

        fn eos_token_id(&self) -> Option<u32> {
            Some(2)
        }

        fn pad_token_id(&self) -> Option<u32> {
            Some(0)
        }
    }

    #[test]
    fn test_decode_piece_word_boundary_becomes_space() {
        let tok = MockTokenizer::new();
        assert_eq!(tok.decode_piece(3, 4).unwrap(), " world");
    }

    #[test]
    fn test_decode_piece_strips_space_after_bos() {
        let tok = MockTokenizer::new();
        assert_eq!(tok.decode_piece(1, 3).unwrap(), "hello");
    }

    #[test]
    fn test_decode_piece_subword_has_no_space() {
        let tok = MockTokenizer::new();
        assert_eq!(tok.decode_piece(3, 5).unwrap(), "ing");
    }

    #[test]
    fn test_decode_piece_special_tokens_are_empty() {
        let tok = MockTokenizer::new();
        assert_eq!(tok.decode_piece(3, 2).unwrap(), "");
        assert_eq!(tok.decode_piece(3, 1).unwrap(), "");
        assert_eq!(tok.decode_piece(3, 0).unwrap(), "");
    }

    #[test]
    fn test_decode_piece_byte_token() {
        let tok = MockTokenizer::new();
        assert_eq!(tok.decode_piece(3, 6).unwrap(), "\n");
    }

    #[test]
    fn test_decode_piece_out_of_range() {
        let tok = MockTokenizer::new();
        let err = tok.decode_piece(3, 100).unwrap_err();
        assert!(matches!(err, InferenceError::Tokenizer(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_tokenizer_codec_forwards() {
        let tok = MockTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        assert_eq!(codec.decode_piece(1, 4).unwrap(), "world");
    }

    #[test]
    fn test_parse_byte_token() {
        assert_eq!(parse_byte_token("<0x41>"), Some(0x41));
        assert_eq!(parse_byte_token("<0xZZ>"), None);
        assert_eq!(parse_byte_token("<0x411>"), None);
        assert_eq!(parse_byte_token("hello"), None);
    }

    /// Vocabulary of `<pad>`, `<s>`, `</s>`, `▁` and all 256 byte tokens.
    struct ByteTokenizer {
        vocab: Vec<String>,
    }

    impl ByteTokenizer {
        fn new() -> Self {
            let mut vocab: Vec<String> = ["<pad>", "<s>", "</s>", "\u{2581}"]
                .into_iter()
                .map(String::from)
                .collect();
            vocab.extend((0..=255u8).map(|b| format!("<0x{:02X}>", b)));
            Self { vocab }
        }

        fn byte_id(b: u8) -> u32 {
            4 + b as u32
        }
    }

    impl Tokenizer for ByteTokenizer {
        fn encode(&self, _text: &str, _add_special_tokens: bool) -> Vec<u32> {
            Vec::new()
        }

        fn decode(&self, _ids: &[u32]) -> String {
            String::new()
        }

        fn vocab_size(&self) -> usize {
            self.vocab.len()
        }

        fn id_to_piece(&self, id: u32) -> Option<&str> {
            self.vocab.get(id as usize).map(String::as_str)
        }

        fn bos_token_id(&self) -> Option<u32> {
            Some(1)
        }

        fn eos_token_id(&self) -> Option<u32> {
            Some(2)
        }

        fn pad_token_id(&self) -> Option<u32> {
            Some(0)
        }
    }

    #[test]
    fn test_codec_joins_split_character() {
        let tok = ByteTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        // "é" is C3 A9.
        let c3 = ByteTokenizer::byte_id(0xC3);
        let a9 = ByteTokenizer::byte_id(0xA9);
        assert_eq!(codec.decode_piece(3, c3).unwrap(), "");
        assert_eq!(codec.decode_piece(c3, a9).unwrap(), "\u{e9}");
        assert_eq!(codec.flush(), "");
    }

    #[test]
    fn test_codec_four_byte_character() {
        let tok = ByteTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        let mut out = String::new();
        let mut prev = 1;
        for b in "\u{1F30D}".bytes() {
            let id = ByteTokenizer::byte_id(b);
            out.push_str(&codec.decode_piece(prev, id).unwrap());
            prev = id;
        }
        assert_eq!(out, "\u{1F30D}");
    }

    #[test]
    fn test_codec_invalid_byte_is_replaced() {
        let tok = ByteTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        assert_eq!(codec.decode_piece(3, ByteTokenizer::byte_id(0xFF)).unwrap(), "\u{FFFD}");
    }

    #[test]
    fn test_codec_truncated_character_then_text() {
        let tok = ByteTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        assert_eq!(codec.decode_piece(3, ByteTokenizer::byte_id(0xC3)).unwrap(), "");
        // A word-boundary marker cannot complete the character.
        assert_eq!(codec.decode_piece(4, 3).unwrap(), "\u{FFFD} ");
    }

    #[test]
    fn test_codec_flush_releases_pending_bytes() {
        let tok = ByteTokenizer::new();
        let codec = TokenizerCodec::new(&tok);
        assert_eq!(codec.decode_piece(3, ByteTokenizer::byte_id(0xE2)).unwrap(), "");
        assert_eq!(codec.flush(), "\u{FFFD}");
        assert_eq!(codec.flush(), "");
    }

    #[test]
    fn test_stateless_decode_piece_partial_byte() {
        let tok = ByteTokenizer::new();
        assert_eq!(tok.decode_piece(3, ByteTokenizer::byte_id(0xC3)).unwrap(), "\u{FFFD}");
        assert_eq!(tok.decode_piece_bytes(3, ByteTokenizer::byte_id(0xC3)).unwrap(), vec![0xC3]);
    }
}
