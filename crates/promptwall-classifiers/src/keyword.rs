//! Offline intent classifier
//!
//! Flags prompts containing known manipulation phrases. Matching is a single
//! Aho-Corasick pass, ASCII case-insensitive, so it adds microseconds to a
//! request and needs no network.

use std::fmt;

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use promptwall_core::{Error, Result};
use tracing::debug;

use crate::classifier::{IntentClassifier, LABEL_MALICIOUS, LABEL_SAFE};

/// Kind of manipulation a phrase indicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseCategory {
    /// "ignore previous instructions"
    InstructionOverride,
    /// "developer mode", "jailbreak"
    Jailbreak,
    /// "reveal your system prompt"
    SystemExtraction,
    /// "<<SYS>>", "[INST]"
    DelimiterAttack,
    /// Phrases added through configuration
    Custom,
}

impl PhraseCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InstructionOverride => "instruction_override",
            Self::Jailbreak => "jailbreak",
            Self::SystemExtraction => "system_extraction",
            Self::DelimiterAttack => "delimiter_attack",
            Self::Custom => "custom",
        }
    }
}

const INSTRUCTION_OVERRIDE: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "ignore your instructions",
    "ignore the above",
    "disregard previous",
    "disregard all prior",
    "forget your instructions",
    "forget everything above",
    "override your instructions",
    "your new instructions are",
    "do not follow your",
];

const JAILBREAK: &[&str] = &[
    "jailbreak",
    "jailbroken",
    "dan mode",
    "do anything now",
    "developer mode",
    "god mode",
    "unrestricted mode",
    "bypass your",
    "disable all safety",
    "ignore safety",
    "remove all filters",
];

const SYSTEM_EXTRACTION: &[&str] = &[
    "repeat your instructions",
    "repeat your system",
    "show your system prompt",
    "print your instructions",
    "print your system",
    "what is your system prompt",
    "reveal your instructions",
    "reveal your system",
    "output your instructions",
];

const DELIMITER_ATTACK: &[&str] = &["<|system|>", "<<sys>>", "<</sys>>", "[inst]", "[/inst]", "begin system prompt"];

/// A phrase found in a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseHit {
    pub category: PhraseCategory,
    pub phrase: String,
    pub start: usize,
    pub end: usize,
}

/// Phrase-matching intent classifier
pub struct KeywordIntentClassifier {
    name: String,
    matcher: AhoCorasick,
    phrases: Vec<(PhraseCategory, String)>,
}

impl fmt::Debug for KeywordIntentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordIntentClassifier")
            .field("name", &self.name)
            .field("phrases", &self.phrases.len())
            .finish()
    }
}

impl KeywordIntentClassifier {
    /// Create a classifier with the default phrase list
    pub fn new() -> Result<Self> {
        Self::with_phrases(Vec::<String>::new())
    }

    /// Create a classifier with the default phrases plus `extra`
    pub fn with_phrases<I, S>(extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let builtin = [
            (PhraseCategory::InstructionOverride, INSTRUCTION_OVERRIDE),
            (PhraseCategory::Jailbreak, JAILBREAK),
            (PhraseCategory::SystemExtraction, SYSTEM_EXTRACTION),
            (PhraseCategory::DelimiterAttack, DELIMITER_ATTACK),
        ];

        let mut phrases: Vec<(PhraseCategory, String)> = builtin
            .iter()
            .flat_map(|(category, list)| list.iter().map(move |p| (*category, p.to_string())))
            .collect();
        phrases.extend(
            extra
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .map(|p| (PhraseCategory::Custom, p)),
        );

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(phrases.iter().map(|(_, p)| p.as_str()))
            .map_err(|e| Error::config(format!("failed to build intent phrase matcher: {}", e)))?;

        Ok(Self {
            name: "keyword-intent".to_string(),
            matcher,
            phrases,
        })
    }

    /// First phrase found in `text`, if any
    pub fn detect(&self, text: &str) -> Option<PhraseHit> {
        self.matcher.find(text).map(|m| {
            let (category, phrase) = &self.phrases[m.pattern().as_usize()];
            PhraseHit {
                category: *category,
                phrase: phrase.clone(),
                start: m.start(),
                end: m.end(),
            }
        })
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str) -> Result<String> {
        match self.detect(text) {
            Some(hit) => {
                debug!(category = hit.category.label(), "Manipulation phrase detected");
                Ok(LABEL_MALICIOUS.to_string())
            }
            None => Ok(LABEL_SAFE.to_string()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
