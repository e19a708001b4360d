//! HTTP solver client and reply interpretation

use crate::config::SolverConfig;
use crate::error::SolverError;
use quboard_script::{OptimizationPayload, PolyExpr};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::{debug, warn};

/// A solved move
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverReply {
    /// Value of the return expression under the solver's best sample
    pub selected_position: i64,
    pub sample: Option<BTreeMap<String, f64>>,
    pub explanation: Option<serde_json::Value>,
}

/// Anything that can turn a payload into a position
pub trait Solver: Send + Sync {
    fn solve(
        &self,
        payload: &OptimizationPayload,
    ) -> impl Future<Output = Result<SolverReply, SolverError>> + Send;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

#[derive(Clone, Debug)]
pub struct HttpSolver {
    config: SolverConfig,
    client: reqwest::Client,
}

impl HttpSolver {
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SolverError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    async fn post(&self, payload: &OptimizationPayload) -> Result<SolverReply, SolverError> {
        debug!(
            endpoint = %self.config.endpoint,
            variables = payload.variables.len(),
            "posting payload"
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| SolverError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SolverError::Transport(e.to_string()))?;
        let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();

        if let Some(message) = body.as_ref().and_then(|b| b.get("error")).filter(|e| !e.is_null()) {
            let message = match message {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(SolverError::Server {
                status: Some(status.as_u16()),
                message,
            });
        }
        if !status.is_success() {
            return Err(SolverError::Server {
                status: Some(status.as_u16()),
                message: body.map(|b| b.to_string()).unwrap_or(text),
            });
        }
        let body = body.ok_or_else(|| SolverError::Semantic("response body is not JSON".into()))?;
        parse_reply(&body, payload)
    }
}

impl Solver for HttpSolver {
    async fn solve(&self, payload: &OptimizationPayload) -> Result<SolverReply, SolverError> {
        self.post(payload).await
    }
}

// ============================================================================
// REPLY PARSING
// ============================================================================

fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Some(n as i64)
    } else {
        None
    }
}

fn position(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

/// Interpret a successful reply body
///
/// When the reply includes a `sample`, the payload's return expression is
/// re-evaluated under it; a mismatch is logged, not treated as a failure.
pub fn parse_reply(
    body: &serde_json::Value,
    payload: &OptimizationPayload,
) -> Result<SolverReply, SolverError> {
    let raw = body
        .get("return")
        .ok_or_else(|| SolverError::Semantic("missing 'return' field".into()))?;
    let selected_position = position(raw)
        .ok_or_else(|| SolverError::Semantic(format!("'return' is not an integer: {}", raw)))?;

    let sample = body.get("sample").and_then(|s| s.as_object()).map(|map| {
        map.iter()
            .filter_map(|(k, v)| v.as_f64().map(|v| (k.clone(), v)))
            .collect::<BTreeMap<_, _>>()
    });
    if let Some(sample) = &sample {
        cross_check(payload, sample, selected_position);
    }

    Ok(SolverReply {
        selected_position,
        sample,
        explanation: body.get("explanation").cloned(),
    })
}

fn cross_check(payload: &OptimizationPayload, sample: &BTreeMap<String, f64>, selected: i64) {
    let mut values: HashMap<String, f64> = payload
        .variables
        .declared_names()
        .into_iter()
        .map(|n| (n, 0.0))
        .collect();
    values.extend(sample.iter().map(|(k, v)| (k.clone(), *v)));

    let local = match PolyExpr::parse(&payload.return_expression) {
        Ok(expr) => expr.evaluate(&values),
        Err(e) => Err(e.to_string()),
    };
    match local {
        Ok(local) if integral(local) == Some(selected) => {}
        Ok(local) => warn!(selected, local, "solver return disagrees with its sample"),
        Err(error) => warn!(%error, "could not re-evaluate return expression"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quboard_script::{Comparator, Constraint, VariableKind};
    use serde_json::json;

    fn payload() -> OptimizationPayload {
        OptimizationPayload {
            variables: [("x0", VariableKind::Binary), ("x4", VariableKind::Binary)]
                .into_iter()
                .map(|(n, k)| (n.to_string(), k))
                .collect(),
            constraints: vec![Constraint::new("x0 + x4", Comparator::Eq, 1.0)],
            objective: "-1 * x4".into(),
            return_expression: "0 * x0 + 4 * x4".into(),
        }
    }

    #[test]
    fn test_return_forms() {
        for raw in [json!(4), json!(4.0), json!("4"), json!(" 4 ")] {
            let reply = parse_reply(&json!({ "return": raw }), &payload()).unwrap();
            assert_eq!(reply.selected_position, 4);
        }
    }

    #[test]
    fn test_bad_return_is_semantic() {
        let bodies = [
            json!({}),
            json!({"return": "four"}),
            json!({"return": 4.5}),
            json!({"return": null}),
        ];
        for body in bodies {
            assert!(matches!(parse_reply(&body, &payload()), Err(SolverError::Semantic(_))));
        }
    }

    #[test]
    fn test_sample_and_explanation_kept() {
        let body = json!({
            "return": "4",
            "sample": {"x0": 0, "x4": 1},
            "explanation": {"method": "simulated_annealing"}
        });
        let reply = parse_reply(&body, &payload()).unwrap();
        assert_eq!(reply.sample.unwrap()["x4"], 1.0);
        assert_eq!(reply.explanation.unwrap()["method"], "simulated_annealing");
    }

    #[test]
    fn test_sample_mismatch_is_not_fatal() {
        let body = json!({"return": 0, "sample": {"x0": 0, "x4": 1}});
        assert_eq!(parse_reply(&body, &payload()).unwrap().selected_position, 0);
    }
}
