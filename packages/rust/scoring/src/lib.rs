//! Rule-driven lead quality scoring.
//!
//! Rules are data ([`ScoreRule`]), editable in the config file without
//! redeploying. The engine sums the points of every satisfied, enabled rule
//! and clamps the result to 0–100. Scores are recomputed by the fusion
//! engine whenever a field changes, never by a background sweep alone.

use leadflow_shared::{Condition, Lead, ScoreRule};
use tracing::debug;

/// Upper bound of the quality score.
pub const MAX_SCORE: i32 = 100;

/// Built-in rule set, applied when the config carries no custom rules.
/// The points sum to 100 by construction; custom sets may exceed that
/// before clamping.
pub fn default_rules() -> Vec<ScoreRule> {
    let rule = |field: &str, points: i32| ScoreRule {
        field: field.into(),
        condition: Condition::IsNotEmpty,
        points,
        enabled: true,
    };
    vec![
        rule("email", 30),
        rule("phone", 25),
        rule("website", 15),
        rule("firm_name", 10),
        rule("practice_area", 10),
        ScoreRule {
            field: "email_verified".into(),
            condition: Condition::EqualsOne,
            points: 10,
            enabled: true,
        },
    ]
}

/// The configured rule set, or the built-in defaults when none is configured.
pub fn effective_rules(configured: &[ScoreRule]) -> Vec<ScoreRule> {
    if configured.is_empty() {
        default_rules()
    } else {
        configured.to_vec()
    }
}

/// Evaluate `rules` against `lead` and return the clamped score.
pub fn score(lead: &Lead, rules: &[ScoreRule]) -> u8 {
    let total: i32 = rules
        .iter()
        .filter(|rule| rule.enabled && satisfied(rule, lead))
        .map(|rule| rule.points)
        .sum();
    total.clamp(0, MAX_SCORE) as u8
}

fn satisfied(rule: &ScoreRule, lead: &Lead) -> bool {
    let Some(value) = lead.rule_value(&rule.field) else {
        // Rules naming a field outside the vocabulary never fire.
        debug!(field = %rule.field, "scoring rule references unknown field");
        return false;
    };
    let value = value.trim();
    match rule.condition {
        Condition::IsNotEmpty => !value.is_empty(),
        Condition::IsEmpty => value.is_empty(),
        Condition::EqualsOne => value == "1",
    }
}
