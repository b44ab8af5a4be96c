use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::bot_profile::GateConfig;
use crate::utils::text::{char_len, subject_token, word_count};

/// Unresolved template tokens a model sometimes echoes back.
pub(crate) static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\{\{?[^{}]*\}?\}|\[[^\[\]]*\]|<[A-Z_ ]{2,}>|\b(?:placeholder|lorem ipsum)\b|\binsert [a-z ]{0,20}here\b|\byour [a-z ]{0,20}here\b",
    )
    .expect("placeholder pattern is valid")
});

/// Links, markup and code fragments. Each match counts as one hit.
pub(crate) static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)https?://\S+|\bwww\.\S+|```|</?[a-z][a-z0-9]*[^<>]*>|\b\w+\([^()]*\)\s*[;{]|=>|::|==|!=|&&|\|\||\b(?:fn|def|function)\s+\w+\s*\(",
    )
    .expect("code pattern is valid")
});

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)#[A-Za-z][A-Za-z0-9_]*").expect("hashtag pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("{len} chars exceeds limit of {max}")]
    TooLong { len: usize, max: usize },
    #[error("unresolved placeholder `{0}`")]
    Placeholder(String),
    #[error("{hits} code/link patterns (tolerance {tolerance})")]
    CodeLike { hits: usize, tolerance: usize },
    #[error("{count} words, need at least {min}")]
    TooFewWords { count: usize, min: usize },
    #[error("{count} words, allowed at most {max}")]
    TooManyWords { count: usize, max: usize },
    #[error("no hashtag")]
    MissingHashtag,
    #[error("does not mention `{0}`")]
    MissingSubject(String),
}

/// Structural checks applied to generated text before it may be published.
#[derive(Debug, Clone)]
pub struct QualityGate {
    rules: GateConfig,
}

impl QualityGate {
    pub fn new(rules: GateConfig) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &GateConfig {
        &self.rules
    }

    pub fn accepts(&self, text: &str, source_headline: &str, require_subject: bool) -> bool {
        self.check(text, source_headline, require_subject).is_ok()
    }

    pub fn check(&self, text: &str, source_headline: &str, require_subject: bool) -> Result<(), Rejection> {
        self.check_reply(text)?;

        let hits = CODE_RE.find_iter(text).count();
        if hits > self.rules.code_tolerance {
            return Err(Rejection::CodeLike { hits, tolerance: self.rules.code_tolerance });
        }

        let count = word_count(text);
        if count < self.rules.min_words {
            return Err(Rejection::TooFewWords { count, min: self.rules.min_words });
        }
        if count > self.rules.max_words {
            return Err(Rejection::TooManyWords { count, max: self.rules.max_words });
        }

        if self.rules.require_hashtag && !HASHTAG_RE.is_match(text) {
            return Err(Rejection::MissingHashtag);
        }

        if require_subject {
            if let Some(subject) = subject_token(source_headline) {
                if !text.to_lowercase().contains(&subject.to_lowercase()) {
                    return Err(Rejection::MissingSubject(subject));
                }
            }
        }

        Ok(())
    }

    /// Thread replies only need to fit and be free of template debris.
    pub fn check_reply(&self, text: &str) -> Result<(), Rejection> {
        let len = char_len(text);
        if len > self.rules.max_chars {
            return Err(Rejection::TooLong { len, max: self.rules.max_chars });
        }
        if let Some(m) = PLACEHOLDER_RE.find(text) {
            return Err(Rejection::Placeholder(m.as_str().to_string()));
        }
        Ok(())
    }
}
