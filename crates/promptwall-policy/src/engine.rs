//! Firewall engine
//!
//! Applies an ordered policy set to one prompt. Block policies run first and
//! the first one with a match ends evaluation; redact policies then rewrite
//! the working text one after another, each seeing the output of the last.

use promptwall_core::{Error, PolicyAction, PolicyMatch, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::rule::CompiledPolicy;

/// Stateless policy evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct FirewallEngine;

/// Output of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Match evidence in evaluation order
    pub matches: Vec<PolicyMatch>,

    /// Working text after every redact policy ran (the prompt itself when blocked)
    pub redacted_text: String,

    /// Block policy that terminated evaluation
    pub blocked_by: Option<BlockedBy>,

    /// Policies that were skipped
    pub warnings: Vec<EngineWarning>,
}

impl Evaluation {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedBy {
    pub policy_id: String,
    pub policy_name: String,
}

/// A policy the engine could not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineWarning {
    pub policy_id: String,
    pub policy_name: String,
    pub reason: String,
}

impl FirewallEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `prompt` against `policies` in membership order
    pub fn evaluate<P: AsRef<CompiledPolicy>>(&self, prompt: &str, policies: &[P]) -> Result<Evaluation> {
        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt must not be empty"));
        }

        let mut warnings = Vec::new();
        let enforceable: Vec<(&CompiledPolicy, &Regex)> = policies
            .iter()
            .map(|p| AsRef::<CompiledPolicy>::as_ref(p))
            .filter(|policy| policy.is_active())
            .filter_map(|policy| match policy.regex() {
                Some(regex) => Some((policy, regex)),
                None => {
                    let reason = policy.compile_error().unwrap_or("pattern not compiled").to_string();
                    warn!(
                        policy_id = %policy.id(),
                        policy_name = %policy.name(),
                        reason = %reason,
                        "Skipping policy with invalid pattern"
                    );
                    warnings.push(EngineWarning {
                        policy_id: policy.id().to_string(),
                        policy_name: policy.name().to_string(),
                        reason,
                    });
                    None
                }
            })
            .collect();

        for (policy, regex) in enforceable.iter().filter(|(p, _)| p.action() == PolicyAction::Block) {
            let matches = find_matches(policy, regex, prompt);
            if matches.is_empty() {
                continue;
            }

            debug!(policy_name = %policy.name(), spans = matches.len(), "Block policy matched");
            return Ok(Evaluation {
                matches,
                redacted_text: prompt.to_string(),
                blocked_by: Some(BlockedBy {
                    policy_id: policy.id().to_string(),
                    policy_name: policy.name().to_string(),
                }),
                warnings,
            });
        }

        let mut working = prompt.to_string();
        let mut evidence = Vec::new();
        for (policy, regex) in enforceable.iter().filter(|(p, _)| p.action() == PolicyAction::Redact) {
            let matches = find_matches(policy, regex, &working);
            if matches.is_empty() {
                continue;
            }

            debug!(policy_name = %policy.name(), spans = matches.len(), "Redact policy matched");
            working = splice(&working, &matches, &policy.policy.replacement);
            evidence.extend(matches);
        }

        Ok(Evaluation {
            matches: evidence,
            redacted_text: working,
            blocked_by: None,
            warnings,
        })
    }
}

/// Non-empty matches of one policy against `text`
fn find_matches(policy: &CompiledPolicy, regex: &Regex, text: &str) -> Vec<PolicyMatch> {
    regex
        .find_iter(text)
        .filter(|m| !m.as_str().is_empty())
        .map(|m| PolicyMatch {
            policy_id: policy.id().to_string(),
            policy_name: policy.name().to_string(),
            action: policy.action(),
            matched_text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Replace each span with the literal replacement, back to front so offsets stay valid
fn splice(text: &str, spans: &[PolicyMatch], replacement: &str) -> String {
    let mut result = text.to_string();
    for span in spans.iter().rev() {
        if span.start < span.end && span.end <= result.len() {
            result.replace_range(span.start..span.end, replacement);
        }
    }
    result
}
