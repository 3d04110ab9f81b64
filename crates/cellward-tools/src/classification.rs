//! Classification levels and the pure policy engine (spec §6.2).

use cellward_protocol::{Range, SheetId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data sensitivity ladder. Ordered so the maximum of several
/// intersecting classification records is simply their `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Classification {
    #[default]
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// What part of the document a [`ClassificationRecord`] applies to.
/// Ranked document < sheet < column < cell < range for the per-cell
/// fold in [`crate::dlp_index`] — a more specific selector overrides a
/// broader one covering the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ClassificationSelector {
    Document,
    Sheet { sheet: SheetId },
    Column { sheet: SheetId, column: u32 },
    Cell { sheet: SheetId, row: u32, column: u32 },
    Range { range: Range },
}

impl ClassificationSelector {
    /// Specificity rank used to resolve overlapping selectors; higher
    /// wins (spec §4.4 "per-cell enforcement index").
    pub fn rank(&self) -> u8 {
        match self {
            ClassificationSelector::Document => 0,
            ClassificationSelector::Sheet { .. } => 1,
            ClassificationSelector::Column { .. } => 2,
            ClassificationSelector::Range { .. } => 3,
            ClassificationSelector::Cell { .. } => 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub selector: ClassificationSelector,
    pub classification: Classification,
}

/// Decision a policy evaluation can produce for an `ai.cloudProcessing`
/// action against a given effective classification (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Redact,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub max_allowed: Classification,
    #[serde(default)]
    pub allow_restricted_content: bool,
    #[serde(default = "default_true")]
    pub redact_disallowed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub version: u32,
    #[serde(default)]
    pub allow_document_overrides: bool,
    pub rules: HashMap<String, PolicyRule>,
}

impl PolicyRecord {
    pub fn rule_for(&self, action: &str) -> Option<&PolicyRule> {
        self.rules.get(action)
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEvaluationInput<'a> {
    pub action: &'a str,
    pub classification: Classification,
    pub policy: &'a PolicyRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEvaluation {
    pub decision: Decision,
    pub max_allowed: Classification,
    pub classification: Classification,
}

/// Pure policy engine: no I/O, no audit emission — a function of its
/// three inputs only (spec §6.2 `evaluatePolicy`).
///
/// Absent a rule for `action`, the conservative default is `BLOCK` at
/// `Public` so a misconfigured policy document fails closed rather
/// than silently allowing everything through.
pub fn evaluate_policy(input: PolicyEvaluationInput<'_>) -> PolicyEvaluation {
    let rule = match input.policy.rule_for(input.action) {
        Some(rule) => rule,
        None => {
            return PolicyEvaluation {
                decision: Decision::Block,
                max_allowed: Classification::Public,
                classification: input.classification,
            }
        }
    };

    let decision = if input.classification <= rule.max_allowed {
        Decision::Allow
    } else if input.classification == Classification::Restricted && !rule.allow_restricted_content
    {
        Decision::Block
    } else if rule.redact_disallowed {
        Decision::Redact
    } else {
        Decision::Block
    };

    PolicyEvaluation {
        decision,
        max_allowed: rule.max_allowed,
        classification: input.classification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_allowed: Classification, redact_disallowed: bool) -> PolicyRecord {
        let mut rules = HashMap::new();
        rules.insert(
            "ai.cloudProcessing".to_string(),
            PolicyRule { max_allowed, allow_restricted_content: false, redact_disallowed },
        );
        PolicyRecord { version: 1, allow_document_overrides: false, rules }
    }

    #[test]
    fn allows_at_or_under_max() {
        let p = policy(Classification::Confidential, true);
        let eval = evaluate_policy(PolicyEvaluationInput {
            action: "ai.cloudProcessing",
            classification: Classification::Internal,
            policy: &p,
        });
        assert_eq!(eval.decision, Decision::Allow);
    }

    #[test]
    fn redacts_above_max_when_allowed() {
        let p = policy(Classification::Internal, true);
        let eval = evaluate_policy(PolicyEvaluationInput {
            action: "ai.cloudProcessing",
            classification: Classification::Confidential,
            policy: &p,
        });
        assert_eq!(eval.decision, Decision::Redact);
    }

    #[test]
    fn blocks_restricted_without_override() {
        let p = policy(Classification::Confidential, true);
        let eval = evaluate_policy(PolicyEvaluationInput {
            action: "ai.cloudProcessing",
            classification: Classification::Restricted,
            policy: &p,
        });
        assert_eq!(eval.decision, Decision::Block);
    }

    #[test]
    fn blocks_above_max_when_redact_disabled() {
        let p = policy(Classification::Internal, false);
        let eval = evaluate_policy(PolicyEvaluationInput {
            action: "ai.cloudProcessing",
            classification: Classification::Confidential,
            policy: &p,
        });
        assert_eq!(eval.decision, Decision::Block);
    }

    #[test]
    fn unknown_action_fails_closed() {
        let p = policy(Classification::Restricted, true);
        let eval = evaluate_policy(PolicyEvaluationInput {
            action: "ai.somethingElse",
            classification: Classification::Public,
            policy: &p,
        });
        assert_eq!(eval.decision, Decision::Block);
    }
}
