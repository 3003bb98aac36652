//! Vocabulary-table tokenizer for SentencePiece-style vocabularies.
//!
//! Encoding replaces spaces with the `\u{2581}` word-boundary marker and
//! then greedily takes the longest vocabulary entry at each position.
//! Characters with no entry fall back to byte tokens `<0x00>` .. `<0xFF>`.

use std::collections::HashMap;

use tracing::debug;

use super::{parse_byte_token, Tokenizer, SPIECE_UNDERLINE};

pub struct VocabTokenizer {
    /// Token string -> token ID (special tokens excluded).
    token_to_id: HashMap<String, u32>,
    /// Token ID -> token string.
    id_to_token: Vec<String>,
    /// Longest entry in bytes; bounds the longest-match search.
    max_token_len: usize,
    bos_id: Option<u32>,
    eos_id: Option<u32>,
    pad_id: Option<u32>,
    /// Whether to prepend BOS when encoding with special tokens.
    add_bos: bool,
}

impl VocabTokenizer {
    /// Create a tokenizer from a vocabulary indexed by token ID.
    pub fn new(
        tokens: Vec<String>,
        bos_id: Option<u32>,
        eos_id: Option<u32>,
        pad_id: Option<u32>,
        add_bos: bool,
    ) -> Self {
        let is_special = |id: u32| Some(id) == bos_id || Some(id) == eos_id || Some(id) == pad_id;

        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (i, tok) in tokens.iter().enumerate() {
            let id = i as u32;
            if !is_special(id) && !tok.is_empty() {
                // First occurrence wins for duplicated entries.
                token_to_id.entry(tok.clone()).or_insert(id);
            }
        }
        let max_token_len = token_to_id.keys().map(|t| t.len()).max().unwrap_or(0);

        debug!(
            vocab_size = tokens.len(),
            max_token_len, "Vocabulary tokenizer initialized"
        );

        Self {
            token_to_id,
            id_to_token: tokens,
            max_token_len,
            bos_id,
            eos_id,
            pad_id,
            add_bos,
        }
    }

    /// Encode one pre-tokenized piece by greedy longest match.
    fn encode_piece(&self, piece: &str, output: &mut Vec<u32>) {
        let mut start = 0;
        while start < piece.len() {
            let rest = &piece[start..];
            let limit = self.max_token_len.min(rest.len());

            let ends = rest
                .char_indices()
                .map(|(i, _)| i)
                .skip(1)
                .chain(std::iter::once(rest.len()));

            let mut matched = None;
            for end in ends.take_while(|&end| end <= limit) {
                if let Some(&id) = self.token_to_id.get(&rest[..end]) {
                    matched = Some((id, end));
                }
            }

            match matched {
                Some((id, len)) => {
                    output.push(id);
                    start += len;
                }
                None => {
                    let ch_len = rest.chars().next().map_or(1, char::len_utf8);
                    self.byte_fallback(&rest[..ch_len], output);
                    start += ch_len;
                }
            }
        }
    }

    /// Encode unknown bytes using byte-fallback tokens `<0x00>` .. `<0xFF>`.
    fn byte_fallback(&self, text: &str, output: &mut Vec<u32>) {
        for byte in text.bytes() {
            let byte_token = format!("<0x{:02X}>", byte);
            if let Some(&id) = self.token_to_id.get(&byte_token) {
                output.push(id);
            }
            // Vocabularies without byte tokens drop the character.
        }
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Vec<u32> {
        let mut output = Vec::new();

        if add_special_tokens && self.add_bos {
            if let Some(bos) = self.bos_id {
                output.push(bos);
            }
        }

        if !text.is_empty() {
            let piece = format!(
                "{}{}",
                SPIECE_UNDERLINE,
                text.replace(' ', &SPIECE_UNDERLINE.to_string())
            );
            self.encode_piece(&piece, &mut output);
        }

        output
    }

    fn decode(&self, ids: &[u32]) -> String {
        // Byte tokens may split a character, so join raw bytes first.
        let mut bytes = Vec::new();
        for &id in ids {
            if Some(id) == self.bos_id || Some(id) == self.eos_id || Some(id) == self.pad_id {
                continue;
            }
            if let Some(token) = self.id_to_token.get(id as usize) {
                match parse_byte_token(token) {
                    Some(byte) => bytes.push(byte),
                    None => bytes.extend_from_slice(token.as_bytes()),
                }
            }
        }
        let result = String::from_utf8_lossy(&bytes).replace(SPIECE_UNDERLINE, " ");
        match result.strip_prefix(' ') {
            Some(stripped) => stripped.to_string(),
            None => result,
        }
    }

    fn vocab_size(&self) -> usize {
        self.id_to_token.len()
    }

    fn id_to_piece(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    fn bos_token_id(&self) -> Option<u32> {
        self.bos_id
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_id
    }

    fn pad_token_id(&self) -> Option<u32> {
        self.pad_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tokenizer() -> VocabTokenizer {
        let tokens = vec![
            "<unk>",        // 0
            "<s>",          // 1
            "</s>",         // 2
            "\u{2581}the",  // 3
            "\u{2581}cat",  // 4
            "\u{2581}",     // 5
            "c",            // 6
            "a",            // 7
            "t",            // 8
            "s",            // 9
            "<0x21>",       // 10 '!'
        ];
        VocabTokenizer::new(
            tokens.into_iter().map(String::from).collect(),
            Some(1),
            Some(2),
            None,
            true,
        )
    }

    #[test]
    fn test_encode_longest_match() {
        let tok = test_tokenizer();
        assert_eq!(tok.encode("the cat", false), vec![3, 4]);
    }

    #[test]
    fn test_encode_adds_bos() {
        let tok = test_tokenizer();
        assert_eq!(tok.encode("the", true), vec![1, 3]);
    }

    #[test]
    fn test_encode_empty_text() {
        let tok = test_tokenizer();
        assert!(tok.encode("", false).is_empty());
        assert_eq!(tok.encode("", true), vec![1]);
    }

    #[test]
    fn test_encode_falls_back_to_shorter_pieces() {
        let tok = test_tokenizer();
        // "cats" -> "▁cat" + "s"
        assert_eq!(tok.encode("cats", false), vec![4, 9]);
    }

    #[test]
    fn test_encode_byte_fallback() {
        let tok = test_tokenizer();
        assert_eq!(tok.encode("cat!", false), vec![4, 10]);
    }

    #[test]
    fn test_encode_unknown_char_without_byte_token_is_dropped() {
        let tok = test_tokenizer();
        assert_eq!(tok.encode("cat?", false), vec![4]);
    }

    #[test]
    fn test_encode_never_matches_special_text() {
        let tok = test_tokenizer();
        let ids = tok.encode("</s>", false);
        assert!(!ids.contains(&2));
    }

    #[test]
    fn test_decode_roundtrip_text() {
        let tok = test_tokenizer();
        let ids = tok.encode("the cats!", true);
        assert_eq!(tok.decode(&ids), "the cats!");
    }

    #[test]
    fn test_decode_piece_streams_words() {
        let tok = test_tokenizer();
        let mut out = String::new();
        let ids = [1u32, 3, 4, 9, 2];
        for pair in ids.windows(2) {
            out.push_str(&tok.decode_piece(pair[0], pair[1]).unwrap());
        }
        assert_eq!(out, "the cats");
    }

    #[test]
    fn test_accessors() {
        let tok = test_tokenizer();
        assert_eq!(tok.vocab_size(), 11);
        assert_eq!(tok.bos_token_id(), Some(1));
        assert_eq!(tok.eos_token_id(), Some(2));
        assert_eq!(tok.pad_token_id(), None);
        assert_eq!(tok.id_to_piece(6), Some("c"));
        assert_eq!(tok.id_to_piece(99), None);
    }

    fn byte_vocab_tokenizer() -> VocabTokenizer {
        let mut tokens: Vec<String> = ["<unk>", "<s>", "</s>", "\u{2581}"]
            .into_iter()
            .map(String::from)
            .collect();
        tokens.extend((0..=255u8).map(|b| format!("<0x{:02X}>", b)));
        VocabTokenizer::new(tokens, Some(1), Some(2), None, true)
    }

    #[test]
    fn test_multibyte_roundtrip_through_byte_tokens() {
        let tok = byte_vocab_tokenizer();
        let ids = tok.encode("\u{e9}", false);
        assert_eq!(ids, vec![3, 4 + 0xC3, 4 + 0xA9]);
        assert_eq!(tok.decode(&ids), "\u{e9}");
    }

    #[test]
    fn test_multibyte_roundtrip_mixed_text() {
        let tok = byte_vocab_tokenizer();
        let text = "caf\u{e9} \u{4f60}\u{597d}";
        let ids = tok.encode(text, true);
        assert_eq!(tok.decode(&ids), text);
    }

    #[test]
    fn test_multibyte_streams_through_codec() {
        let tok = byte_vocab_tokenizer();
        let codec = crate::tokenizer::TokenizerCodec::new(&tok);
        let ids = tok.encode("\u{e9}\u{e8}", true);
        let mut out = String::new();
        for pair in ids.windows(2) {
            out.push_str(&crate::tokenizer::TextCodec::decode_piece(&codec, pair[0], pair[1]).unwrap());
        }
        out.push_str(&codec.flush());
        assert_eq!(out, "\u{e9}\u{e8}");
    }
}
