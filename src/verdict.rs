//! Verdict value types shared by every stage of the pipeline.
//!
//! All of these are request-scoped values; only [`DeepVerdict`] outlives a
//! request, as the payload stored in the result cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single human-readable reason contributing to unsafety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Finding {
    pub text: String,
}

impl Finding {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Push `item` unless an identical entry is already present, keeping first-seen order.
pub fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicVerdict {
    pub suspicious: bool,
    /// Accumulated rule weight, reported even when below the threshold.
    pub score: i32,
    /// Empty unless `suspicious` is set.
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatIntelVerdict {
    pub flagged: bool,
    pub finding: Option<Finding>,
}

impl ThreatIntelVerdict {
    /// No signal: unreachable provider, missing record, or a clean report.
    pub fn not_flagged() -> Self {
        Self::default()
    }

    pub fn flagged(finding: Finding) -> Self {
        Self {
            flagged: true,
            finding: Some(finding),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    #[serde(rename = "vulnerability")]
    pub name: String,
    pub confidence: String,
    pub explanation: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentVerdict {
    /// Always within `0..=100`.
    pub score: u8,
    pub vulnerabilities: Vec<VulnerabilityFinding>,
}

impl ContentVerdict {
    /// Fail-safe outcome used whenever the model output cannot be trusted.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_unsafe(&self, score_threshold: u8) -> bool {
        !self.vulnerabilities.is_empty() || self.score >= score_threshold
    }
}

/// Phase-1 response: `{safe, reasons}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastVerdict {
    pub safe: bool,
    pub reasons: Vec<String>,
}

/// Phase-2 decision, also the value held by the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepVerdict {
    pub safe: bool,
    pub vulnerabilities: Vec<VulnerabilityFinding>,
    pub score: u8,
}

impl DeepVerdict {
    pub fn from_content(verdict: ContentVerdict, score_threshold: u8) -> Self {
        Self {
            safe: !verdict.is_unsafe(score_threshold),
            vulnerabilities: verdict.vulnerabilities,
            score: verdict.score,
        }
    }

    /// Reasons contributed to the fused verdict; empty for a safe decision.
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.safe {
            return reasons;
        }
        for vulnerability in &self.vulnerabilities {
            push_unique(
                &mut reasons,
                format!(
                    "Content analysis: {} ({} confidence)",
                    vulnerability.name, vulnerability.confidence
                ),
            );
        }
        if reasons.is_empty() {
            reasons.push(format!("Content analysis risk score {}/100.", self.score));
        }
        reasons
    }
}

/// The fused, externally visible verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedVerdict {
    pub safe: bool,
    pub reasons: Vec<String>,
    pub score: u8,
}

impl Default for UnifiedVerdict {
    fn default() -> Self {
        Self {
            safe: true,
            reasons: Vec::new(),
            score: 0,
        }
    }
}

impl UnifiedVerdict {
    /// Fold another signal into this verdict. Never turns an unsafe verdict safe.
    pub fn escalate(&mut self, safe: bool, reasons: Vec<String>, score: u8) {
        self.safe = self.safe && safe;
        for reason in reasons {
            push_unique(&mut self.reasons, reason);
        }
        self.score = self.score.max(score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xss() -> VulnerabilityFinding {
        VulnerabilityFinding {
            name: "XSS".to_string(),
            confidence: "High".to_string(),
            explanation: "inline script".to_string(),
            recommendation: "escape output".to_string(),
        }
    }

    #[test]
    fn test_push_unique_keeps_order() {
        let mut items = vec!["a".to_string()];
        push_unique(&mut items, "b".to_string());
        push_unique(&mut items, "a".to_string());
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_content_decision_rule() {
        assert!(!ContentVerdict::empty().is_unsafe(50));
        let high = ContentVerdict {
            score: 50,
            vulnerabilities: Vec::new(),
        };
        assert!(high.is_unsafe(50));
        let vulnerable = ContentVerdict {
            score: 10,
            vulnerabilities: vec![xss()],
        };
        assert!(vulnerable.is_unsafe(50));
    }

    #[test]
    fn test_deep_reasons() {
        let deep = DeepVerdict::from_content(
            ContentVerdict {
                score: 80,
                vulnerabilities: vec![xss()],
            },
            50,
        );
        assert!(!deep.safe);
        assert_eq!(deep.reasons(), vec!["Content analysis: XSS (High confidence)"]);

        let score_only = DeepVerdict::from_content(
            ContentVerdict {
                score: 70,
                vulnerabilities: Vec::new(),
            },
            50,
        );
        assert_eq!(
            score_only.reasons(),
            vec!["Content analysis risk score 70/100."]
        );

        let clean = DeepVerdict::from_content(ContentVerdict::empty(), 50);
        assert!(clean.safe);
        assert!(clean.reasons().is_empty());
    }

    #[test]
    fn test_escalate_is_monotonic() {
        let mut verdict = UnifiedVerdict::default();
        verdict.escalate(
            false,
            vec!["Domain is on a known local blacklist.".to_string()],
            0,
        );
        verdict.escalate(true, Vec::new(), 0);
        assert!(!verdict.safe);

        verdict.escalate(
            false,
            vec![
                "Domain is on a known local blacklist.".to_string(),
                "Content analysis risk score 90/100.".to_string(),
            ],
            90,
        );
        assert_eq!(verdict.reasons.len(), 2);
        assert_eq!(verdict.score, 90);

        verdict.escalate(true, Vec::new(), 10);
        assert_eq!(verdict.score, 90);
    }

    #[test]
    fn test_vulnerability_wire_name() {
        let json = serde_json::to_value(xss()).unwrap();
        assert_eq!(json["vulnerability"], "XSS");
    }
}
