use std::collections::BTreeMap;

use super::domain::{answers, CatRequirements, FormResponses};

/// Normalized reasons for deterministic rejections. These are the only
/// reason strings the rule path ever persists.
pub const REASON_STERILIZATION: &str =
    "sterilization policy violation: applicant does not commit to sterilization";
pub const REASON_NETTING: &str =
    "home safety violation: required protective netting is not in place";
pub const REASON_LIVING_SPACE: &str =
    "living space incompatibility: cat requires a large house, applicant lives in an apartment";

/// Risk-breakdown criterion keys shared with the scorer.
pub mod criteria {
    pub const STERILIZATION: &str = "sterilization";
    pub const HOME_SAFETY: &str = "home_safety";
    pub const LIVING_SPACE: &str = "living_space";
    pub const OVERALL: &str = "overall";
}

const STERILIZATION_SCORE: u8 = 12;
const NETTING_SCORE: u8 = 15;
const LIVING_SPACE_SCORE: u8 = 30;

/// Phrases in the sterilization answer that violate the adoption policy:
/// outright opposition, evasion, or breeding intent.
const STERILIZATION_RED_FLAGS: &[&str] = &[
    "against",
    "opposed",
    "refuse",
    "undecided",
    "not sure",
    "depends",
    "we'll see",
    "maybe later",
    "breed",
    "breeding",
    "kittens",
    "litter",
    "sell",
];

/// Definitive rejection produced by a kill-switch rule, before any external
/// scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub score: u8,
    pub reason: &'static str,
    pub flags: Vec<String>,
    pub risk_breakdown: BTreeMap<String, String>,
}

/// Deterministic kill-switch checks that can reject an application outright.
///
/// Stateless by design; constructed wherever a scorer needs one and handed
/// in explicitly so tests can drive it without the external backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFilter;

impl RuleFilter {
    /// Returns a rejection verdict when any kill-switch rule fires, `None`
    /// otherwise. Rules are checked in priority order; the first match owns
    /// the reason, but all are equally fatal.
    pub fn evaluate(
        &self,
        requirements: &CatRequirements,
        responses: &FormResponses,
    ) -> Option<RuleVerdict> {
        if let Some(verdict) = sterilization_violation(responses) {
            return Some(verdict);
        }

        if let Some(verdict) = missing_netting(requirements, responses) {
            return Some(verdict);
        }

        living_space_mismatch(requirements, responses)
    }
}

fn sterilization_violation(responses: &FormResponses) -> Option<RuleVerdict> {
    let position = responses.text(answers::STERILIZATION_POSITION);

    let opposed_flag = responses.flag(answers::STERILIZATION_POSITION) == Some(false);
    let opposed_text = position.map(contains_red_flag).unwrap_or(false);

    if !(opposed_flag || opposed_text) {
        return None;
    }

    let mut risk_breakdown = BTreeMap::new();
    risk_breakdown.insert(
        criteria::STERILIZATION.to_string(),
        format!(
            "FAIL - stated position '{}' violates the mandatory sterilization policy",
            position.unwrap_or("declined")
        ),
    );

    Some(RuleVerdict {
        score: STERILIZATION_SCORE,
        reason: REASON_STERILIZATION,
        flags: vec!["rejects sterilization".to_string()],
        risk_breakdown,
    })
}

fn contains_red_flag(position: &str) -> bool {
    let lowered = position.to_lowercase();
    STERILIZATION_RED_FLAGS
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

fn missing_netting(
    requirements: &CatRequirements,
    responses: &FormResponses,
) -> Option<RuleVerdict> {
    if !requirements.needs_protective_netting {
        return None;
    }

    if responses.flag(answers::HAS_PROTECTIVE_NETTING) == Some(true) {
        return None;
    }

    let mut risk_breakdown = BTreeMap::new();
    risk_breakdown.insert(
        criteria::HOME_SAFETY.to_string(),
        "FAIL - cat requires protective netting and the applicant declares none".to_string(),
    );

    Some(RuleVerdict {
        score: NETTING_SCORE,
        reason: REASON_NETTING,
        flags: vec!["missing protective netting".to_string()],
        risk_breakdown,
    })
}

fn living_space_mismatch(
    requirements: &CatRequirements,
    responses: &FormResponses,
) -> Option<RuleVerdict> {
    if !requirements.requires_large_house {
        return None;
    }

    let housing = responses.text(answers::HOUSING_TYPE)?.to_lowercase();
    if !(housing.contains("apartment") || housing.contains("flat")) {
        return None;
    }

    let mut risk_breakdown = BTreeMap::new();
    risk_breakdown.insert(
        criteria::LIVING_SPACE.to_string(),
        format!("FAIL - declared housing '{housing}' cannot host a cat that requires a large house"),
    );

    Some(RuleVerdict {
        score: LIVING_SPACE_SCORE,
        reason: REASON_LIVING_SPACE,
        flags: vec!["insufficient living space".to_string()],
        risk_breakdown,
    })
}
