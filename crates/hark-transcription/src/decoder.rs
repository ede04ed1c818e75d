//! Token-to-text decoding.
//!
//! The shipped rule treats each non-zero output cell as a Unicode code point
//! and zero as padding. That matches models whose output head emits raw
//! characters; a model with a real vocabulary needs its own [`TokenDecoder`].

use std::fmt;

use crate::types::{OutputTensor, Transcript};

/// Maps raw integer tokens to text.
pub trait TokenDecoder: Send + Sync {
    /// Decode `tokens`. Must be total: every sequence yields some string.
    fn decode(&self, tokens: &[i32]) -> String;
}

/// Non-zero tokens are code points; zero is skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodePointDecoder;

impl TokenDecoder for CodePointDecoder {
    fn decode(&self, tokens: &[i32]) -> String {
        tokens
            .iter()
            .filter(|&&token| token != 0)
            .map(|&token| code_point(token))
            .collect()
    }
}

/// The character for `token`, or U+FFFD when it is not a Unicode scalar value.
pub fn code_point(token: i32) -> char {
    u32::try_from(token)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Turns an [`OutputTensor`] into a [`Transcript`].
pub struct TranscriptDecoder {
    rule: Box<dyn TokenDecoder>,
}

impl TranscriptDecoder {
    /// Decoder using a custom token rule.
    pub fn new(rule: impl TokenDecoder + 'static) -> Self {
        Self {
            rule: Box::new(rule),
        }
    }

    /// Decode `output` for audio lasting `duration_seconds`.
    pub fn decode(&self, output: &OutputTensor, duration_seconds: f64) -> Transcript {
        Transcript {
            text: self.rule.decode(output.as_slice()),
            duration_seconds,
            token_count: output.len(),
        }
    }
}

impl Default for TranscriptDecoder {
    fn default() -> Self {
        Self::new(CodePointDecoder)
    }
}

impl fmt::Debug for TranscriptDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptDecoder").finish_non_exhaustive()
    }
}
