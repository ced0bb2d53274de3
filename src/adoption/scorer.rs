use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::domain::{
    answers, ApplicationId, CatRequirements, Evaluation, FormResponses, RiskDecision,
};
use super::rules::{criteria, RuleFilter, RuleVerdict};

/// Structured request handed to the external judgment backend.
#[derive(Debug, Clone, Serialize)]
pub struct JudgmentRequest<'a> {
    pub requirements: &'a CatRequirements,
    pub answers: &'a FormResponses,
}

/// Failure modes of the external judgment backend. None of these ever reach
/// the applicant; the scorer absorbs them via the deterministic fallback.
#[derive(Debug, thiserror::Error)]
pub enum JudgmentCallError {
    #[error("judgment backend disabled: no API key configured")]
    Disabled,
    #[error("judgment backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("judgment backend transport failure: {0}")]
    Transport(String),
    #[error("judgment backend returned an unparsable payload")]
    Unparsable,
}

/// Boundary to the external judgment service (an LLM in production).
///
/// Implementations are synchronous and must carry their own bounded timeout
/// so callers never hang; async clients wrap a runtime the way the platform
/// wraps other vendor SDKs.
pub trait JudgmentGateway: Debug + Send + Sync {
    fn judge(&self, request: &JudgmentRequest<'_>) -> Result<Value, JudgmentCallError>;
}

/// Violations found while validating the untrusted backend payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadViolation {
    #[error("payload is not a JSON object")]
    NotObject,
    #[error("decision '{0}' is not one of REJECT, REVIEW, APPROVE")]
    UnknownDecision(String),
    #[error("score is missing or not an integer")]
    ScoreNotInteger,
    #[error("score {0} outside the 0-100 range")]
    ScoreOutOfRange(i64),
    #[error("REJECT decision carries no reason")]
    MissingRejectReason,
    #[error("risk_breakdown is neither a string map nor a string")]
    InvalidBreakdown,
    #[error("flags is not an array of strings")]
    InvalidFlags,
}

/// Backend verdict after strict validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJudgment {
    pub decision: RiskDecision,
    pub score: u8,
    pub reason: Option<String>,
    pub flags: Vec<String>,
    pub risk_breakdown: BTreeMap<String, String>,
}

/// Validate the raw backend payload against the decision contract.
///
/// A bare-string `risk_breakdown` is tolerated and wrapped under the
/// `overall` criterion; everything else must match exactly.
pub fn validate_payload(payload: &Value) -> Result<ValidatedJudgment, PayloadViolation> {
    let object = payload.as_object().ok_or(PayloadViolation::NotObject)?;

    let decision = match object.get("decision").and_then(Value::as_str) {
        Some("REJECT") => RiskDecision::Reject,
        Some("REVIEW") => RiskDecision::Review,
        Some("APPROVE") => RiskDecision::Approve,
        other => {
            return Err(PayloadViolation::UnknownDecision(
                other.unwrap_or("<missing>").to_string(),
            ))
        }
    };

    let score = object
        .get("score")
        .and_then(Value::as_i64)
        .ok_or(PayloadViolation::ScoreNotInteger)?;
    if !(0..=100).contains(&score) {
        return Err(PayloadViolation::ScoreOutOfRange(score));
    }

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);
    if decision == RiskDecision::Reject && reason.is_none() {
        return Err(PayloadViolation::MissingRejectReason);
    }

    let flags = match object.get("flags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(PayloadViolation::InvalidFlags)
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(PayloadViolation::InvalidFlags),
    };

    let risk_breakdown = match object.get("risk_breakdown") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::String(text)) => {
            let mut wrapped = BTreeMap::new();
            wrapped.insert(criteria::OVERALL.to_string(), text.clone());
            wrapped
        }
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(key, value)| {
                value
                    .as_str()
                    .map(|text| (key.clone(), text.to_string()))
                    .ok_or(PayloadViolation::InvalidBreakdown)
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?,
        Some(_) => return Err(PayloadViolation::InvalidBreakdown),
    };

    Ok(ValidatedJudgment {
        decision,
        score: score as u8,
        reason,
        flags,
        risk_breakdown,
    })
}

/// One application in a batch scoring run.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub application_id: ApplicationId,
    pub requirements: CatRequirements,
    pub responses: FormResponses,
}

/// Per-application batch result; failures on one item never abort the run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub application_id: ApplicationId,
    pub evaluation: Evaluation,
}

/// Risk evaluation front door: rule filter short-circuit, external judgment
/// with strict validation, deterministic fallback.
///
/// `score` is a total function — it always produces a usable evaluation and
/// never propagates a backend error to the caller.
#[derive(Debug)]
pub struct RiskScorer {
    rules: RuleFilter,
    gateway: Box<dyn JudgmentGateway>,
}

impl RiskScorer {
    pub fn new(rules: RuleFilter, gateway: Box<dyn JudgmentGateway>) -> Self {
        Self { rules, gateway }
    }

    pub fn rules(&self) -> &RuleFilter {
        &self.rules
    }

    pub fn score(
        &self,
        requirements: &CatRequirements,
        responses: &FormResponses,
        now: DateTime<Utc>,
    ) -> Evaluation {
        if let Some(verdict) = self.rules.evaluate(requirements, responses) {
            return evaluation_from_verdict(verdict, now, None);
        }

        let request = JudgmentRequest {
            requirements,
            answers: responses,
        };

        let payload = match self.call_with_retry(&request) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "judgment backend unavailable, using deterministic fallback");
                return self.fallback(requirements, responses, now, err.to_string());
            }
        };

        match validate_payload(&payload) {
            Ok(judgment) => Evaluation {
                score: judgment.score,
                decision: judgment.decision,
                reason: judgment.reason,
                flags: judgment.flags,
                risk_breakdown: judgment.risk_breakdown,
                evaluated_at: now,
                error: None,
            },
            Err(violation) => {
                warn!(error = %violation, "judgment payload rejected, using deterministic fallback");
                self.fallback(
                    requirements,
                    responses,
                    now,
                    format!("judgment payload rejected: {violation}"),
                )
            }
        }
    }

    /// Score a set of applications sequentially, pausing between items to
    /// respect backend rate limits.
    pub fn score_batch(&self, items: &[BatchItem], delay: Duration, now: DateTime<Utc>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }

            outcomes.push(BatchOutcome {
                application_id: item.application_id.clone(),
                evaluation: self.score(&item.requirements, &item.responses, now),
            });
        }

        outcomes
    }

    fn call_with_retry(&self, request: &JudgmentRequest<'_>) -> Result<Value, JudgmentCallError> {
        match self.gateway.judge(request) {
            Ok(payload) => Ok(payload),
            // A disabled backend will not recover between two calls.
            Err(JudgmentCallError::Disabled) => Err(JudgmentCallError::Disabled),
            Err(_) => self.gateway.judge(request),
        }
    }

    /// Deterministic local evaluator: re-applies the kill-switch rules, then
    /// grades the remaining signals into the review band.
    fn fallback(
        &self,
        requirements: &CatRequirements,
        responses: &FormResponses,
        now: DateTime<Utc>,
        error: String,
    ) -> Evaluation {
        if let Some(verdict) = self.rules.evaluate(requirements, responses) {
            return evaluation_from_verdict(verdict, now, Some(error));
        }

        let (score, flags) = review_band_score(responses);

        let mut risk_breakdown = BTreeMap::new();
        risk_breakdown.insert(
            criteria::OVERALL.to_string(),
            format!(
                "automated judgment unavailable; deterministic screening scored {score}/100, human review required"
            ),
        );

        Evaluation {
            score,
            decision: RiskDecision::Review,
            reason: None,
            flags,
            risk_breakdown,
            evaluated_at: now,
            error: Some(error),
        }
    }
}

const FALLBACK_FLOOR: u8 = 70;
const FALLBACK_CEILING: u8 = 95;

/// Grade positive form signals into the fixed review band.
fn review_band_score(responses: &FormResponses) -> (u8, Vec<String>) {
    let mut score = FALLBACK_FLOOR;
    let mut flags = Vec::new();

    if responses.flag(answers::HAS_EXPERIENCE) == Some(true) {
        score += 5;
        flags.push("prior cat experience".to_string());
    } else {
        flags.push("first cat".to_string());
    }

    if responses.flag(answers::HAS_TIME) == Some(true) {
        score += 5;
    }

    if responses.flag(answers::HAS_SPACE) == Some(true) {
        score += 5;
        flags.push("adequate space".to_string());
    }

    if responses.flag(answers::HAS_PROTECTIVE_NETTING) == Some(true) {
        flags.push("secure home".to_string());
    }

    if responses
        .text(answers::MOTIVATION)
        .map(|motivation| motivation.trim().len() >= 40)
        .unwrap_or(false)
    {
        score += 5;
        flags.push("detailed motivation".to_string());
    }

    if responses
        .text(answers::HOUSING_TYPE)
        .map(|housing| housing.to_lowercase().contains("house"))
        .unwrap_or(false)
    {
        score += 5;
    }

    (score.min(FALLBACK_CEILING), flags)
}

fn evaluation_from_verdict(
    verdict: RuleVerdict,
    now: DateTime<Utc>,
    error: Option<String>,
) -> Evaluation {
    Evaluation {
        score: verdict.score,
        decision: RiskDecision::Reject,
        reason: Some(verdict.reason.to_string()),
        flags: verdict.flags,
        risk_breakdown: verdict.risk_breakdown,
        evaluated_at: now,
        error,
    }
}
