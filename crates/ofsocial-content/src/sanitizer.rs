//! Artifact removal and acceptance checks for raw model output.
//!
//! Instruction-tuned models regularly echo fragments of their instructions
//! ("No hashtags.", "Use emojis", "[casual tone]") into the text they produce.
//! The sanitizer strips those fragments with an ordered list of regex rules,
//! normalizes whitespace, keeps only the first sentence when it is long
//! enough, and falls back to the first substantial line of the raw output
//! when instruction markers survive all of that.

use regex::Regex;

use ofsocial_core::ContentKind;

/// One leaked-instruction pattern and what to replace it with.
///
/// Patterns are matched case-insensitively, in list order.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRule {
    pub pattern: &'static str,
    pub replacement: &'static str,
}

impl ArtifactRule {
    pub const fn strip(pattern: &'static str) -> Self {
        Self {
            pattern,
            replacement: "",
        }
    }
}

/// Built-in artifact rules.
pub const ARTIFACT_RULES: &[ArtifactRule] = &[
    // Conversational preambles at the very start of the reply.
    ArtifactRule::strip(r"^\s*(?:sure|certainly|of course|absolutely|okay|ok)[!,.:]+"),
    ArtifactRule::strip(r"^\s*here(?:'s| is) (?:a|my|the) (?:post|comment)[^:\n]{0,40}:"),
    ArtifactRule::strip(r"No hashtags\.*"),
    ArtifactRule::strip(r"Include.*?:"),
    ArtifactRule::strip(r"Use (?:at least \d+ )?emojis?"),
    ArtifactRule::strip(r"Use internet slang"),
    ArtifactRule::strip(r"Use sarcasm"),
    ArtifactRule::strip(r"Story:"),
    ArtifactRule::strip(r"The story must be"),
    ArtifactRule::strip(r"No passive voice"),
    ArtifactRule::strip(r"Keep it under"),
    ArtifactRule::strip(r"Write a short comment"),
    ArtifactRule::strip(r"as .{0,30}\."),
    ArtifactRule::strip(r"Be .{0,30}\."),
    // Bracketed stage directions.
    ArtifactRule::strip(r"\[[^\]]+\]"),
    ArtifactRule::strip(r"\([^)]*instructions[^)]*\)"),
];

/// Markers that mean an instruction leaked into the cleaned text.
const LEAK_MARKERS: &[&str] = &["include", "use at least", "write a", "post:"];

const POST_REJECT_MARKERS: &[&str] = &[
    "no hashtags",
    "include",
    "use at least",
    "write a comment",
    "post:",
];

const COMMENT_REJECT_MARKERS: &[&str] = &["include", "use", "write a comment"];

/// A first sentence longer than this stands on its own.
const FIRST_SENTENCE_MIN: usize = 20;

/// A raw line longer than this can replace leaked output.
const FALLBACK_LINE_MIN: usize = 20;

struct CompiledRule {
    regex: Regex,
    replacement: &'static str,
}

/// Removes leaked instruction text from generated output.
pub struct ContentSanitizer {
    rules: Vec<CompiledRule>,
    whitespace: Regex,
    sentence_end: Regex,
}

impl ContentSanitizer {
    /// Sanitizer with the built-in [`ARTIFACT_RULES`].
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_rules(ARTIFACT_RULES)
    }

    /// Sanitizer with a custom ordered rule list.
    pub fn with_rules(rules: &[ArtifactRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<CompiledRule, regex::Error> {
                Ok(CompiledRule {
                    regex: Regex::new(&format!("(?i){}", rule.pattern))?,
                    replacement: rule.replacement,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            whitespace: Regex::new(r"\s+")?,
            sentence_end: Regex::new(r"[.!?]")?,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Clean raw model output. Never fails; may return an empty string.
    pub fn clean(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for rule in &self.rules {
            text = rule.regex.replace_all(&text, rule.replacement).into_owned();
        }

        let mut text = self.whitespace.replace_all(&text, " ").trim().to_string();

        let first_sentence = self
            .sentence_end
            .split(&text)
            .next()
            .filter(|first| first.chars().count() > FIRST_SENTENCE_MIN)
            .map(|first| format!("{first}."));
        if let Some(first) = first_sentence {
            text = first;
        }

        if contains_any(&text, LEAK_MARKERS) {
            if let Some(line) = raw
                .split('\n')
                .find(|line| !line.trim().is_empty() && line.chars().count() > FALLBACK_LINE_MIN)
            {
                text = line.trim().to_string();
            }
        }

        text.trim().to_string()
    }

    /// Whether cleaned text is usable as `kind`.
    ///
    /// Text must be non-empty, at least `min_length` characters, and free of
    /// the rejection markers for its kind.
    pub fn is_acceptable(&self, cleaned: &str, kind: ContentKind, min_length: usize) -> bool {
        if cleaned.trim().is_empty() || cleaned.chars().count() < min_length {
            return false;
        }
        let markers = match kind {
            ContentKind::Post => POST_REJECT_MARKERS,
            ContentKind::Comment => COMMENT_REJECT_MARKERS,
        };
        !contains_any(cleaned, markers)
    }
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|marker| lower.contains(marker))
}
