//! Shared types used across ofsocial crates.

use serde::{Deserialize, Serialize};

/// Maximum stored length of a post, in characters.
pub const MAX_POST_LEN: usize = 750;

/// Maximum stored length of a comment, in characters.
pub const MAX_COMMENT_LEN: usize = 750;

/// A named authorial style used to flavor generated comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub style: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: style.into(),
        }
    }

    /// The personas a fresh installation starts with.
    pub fn defaults() -> Vec<Persona> {
        vec![
            Persona::new(
                "Alex Tech",
                "Technical expert, precise, uses jargon naturally",
            ),
            Persona::new(
                "Sam Casual",
                "Friendly, uses emojis naturally, conversational",
            ),
            Persona::new(
                "Dr. Morgan",
                "Academic tone, analytical, cites studies naturally",
            ),
            Persona::new(
                "Charlie",
                "Sarcastic internet troll, uses slang, contrarian",
            ),
        ]
    }
}

/// What a piece of generated text is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Comment,
}

impl ContentKind {
    /// Minimum character count for generated text to be accepted.
    pub fn min_length(self) -> usize {
        match self {
            ContentKind::Post => 30,
            ContentKind::Comment => 15,
        }
    }

    /// Maximum stored character count.
    pub fn max_length(self) -> usize {
        match self {
            ContentKind::Post => MAX_POST_LEN,
            ContentKind::Comment => MAX_COMMENT_LEN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Comment => "comment",
        }
    }
}

/// Sampling parameters for a single generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl GenerationParams {
    /// Default sampling parameters for the given kind of content.
    pub fn for_kind(kind: ContentKind) -> Self {
        let (max_tokens, temperature) = match kind {
            ContentKind::Post => (400, 0.85),
            ContentKind::Comment => (200, 0.9),
        };
        Self {
            max_tokens,
            temperature,
            top_p: 0.95,
            repetition_penalty: 1.15,
        }
    }
}

/// Truncate `text` to at most `max_chars` characters without splitting one.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
