//! Human-in-the-loop confirmation flow.
//!
//! The actual human is an external collaborator; this
//! module defines the protocol and a `HitlResponder` seam the host process
//! plugs a real UI into, plus a scripted responder for tests, grounded on
//! the crate's `MockLlmClient` scripted-turn pattern.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ToolSourceError;
use crate::tools::spec::ToolCallContent;

/// One already-validated request to present to a human.
#[derive(Clone, Debug)]
pub struct HitlRequest {
    pub request_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub default_option: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Where a resolution came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitlSource {
    User,
    Timeout,
}

/// A responder's answer to one `HitlRequest`.
#[derive(Clone, Debug)]
pub struct HitlResolution {
    pub selected_option: Option<String>,
    pub source: HitlSource,
}

/// Seam the host plugs a real human-facing UI into (chat prompt, terminal
/// prompt, web modal, ...). `MockLlmClient`'s scripted-turn shape is the
/// model for `ScriptedHitlResponder` below.
#[async_trait]
pub trait HitlResponder: Send + Sync {
    async fn resolve(&self, request: &HitlRequest) -> HitlResolution;
}

/// A responder that always times out immediately and falls back to
/// `default_option` — useful as a safe default when no UI is wired up, and
/// for headless/batch runs that should never block indefinitely.
pub struct AutoTimeoutResponder;

#[async_trait]
impl HitlResponder for AutoTimeoutResponder {
    async fn resolve(&self, request: &HitlRequest) -> HitlResolution {
        HitlResolution {
            selected_option: request.default_option.clone(),
            source: HitlSource::Timeout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlStatus {
    Confirmed,
    Canceled,
    Timeout,
    Error,
}

#[derive(Clone, Debug, Serialize)]
struct HitlOutcome {
    ok: bool,
    status: HitlStatus,
    confirmed: bool,
    #[serde(rename = "selectedOption")]
    selected_option: Option<String>,
    source: String,
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Trims and dedupes options case-insensitively, keeping the first-seen
/// casing as the display label.
pub fn normalize_options(options: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for option in options {
        let trimmed = option.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            result.push(trimmed.to_string());
        }
    }
    result
}

fn source_label(source: HitlSource) -> &'static str {
    match source {
        HitlSource::User => "user",
        HitlSource::Timeout => "timeout",
    }
}

/// Runs the full `human_intervention_request` protocol: normalize and
/// validate options, ask the primary question, optionally ask a
/// confirm/cancel follow-up, and produce the final result JSON.
pub async fn run_human_intervention(
    args: &Value,
    responder: &dyn HitlResponder,
) -> Result<ToolCallContent, ToolSourceError> {
    let question = args
        .get("question")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let raw_options: Vec<String> = args
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let options = normalize_options(&raw_options);

    let default_option = args
        .get("defaultOption")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    if let Some(ref default) = default_option {
        if !options.iter().any(|o| o == default) {
            return Err(ToolSourceError::InvalidArguments(format!(
                "defaultOption {default:?} does not match any of the provided options"
            )));
        }
    }

    let timeout_ms = match args.get("timeoutMs") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let ms = v
                .as_u64()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ToolSourceError::InvalidArguments("timeoutMs must be a positive integer".into()))?;
            Some(ms)
        }
    };

    let require_confirmation = args
        .get("requireConfirmation")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let request_id = Uuid::new_v4().to_string();
    let primary = responder
        .resolve(&HitlRequest {
            request_id: request_id.clone(),
            question,
            options,
            default_option,
            timeout_ms,
        })
        .await;

    let (status, confirmed, selected_option, source) = match primary.selected_option {
        None => (HitlStatus::Canceled, false, None, primary.source),
        Some(selection) if !require_confirmation => {
            (HitlStatus::Confirmed, true, Some(selection), primary.source)
        }
        Some(selection) => {
            let confirm_options = vec!["Confirm".to_string(), "Cancel".to_string()];
            let confirmation = responder
                .resolve(&HitlRequest {
                    request_id: request_id.clone(),
                    question: format!("Confirm selection: {selection}?"),
                    options: confirm_options,
                    default_option: Some("Cancel".to_string()),
                    timeout_ms,
                })
                .await;
            match confirmation.selected_option.as_deref() {
                Some("Confirm") => (HitlStatus::Confirmed, true, Some(selection), confirmation.source),
                Some(_) => (HitlStatus::Canceled, false, Some(selection), confirmation.source),
                None => (HitlStatus::Timeout, false, Some(selection), confirmation.source),
            }
        }
    };

    let outcome = HitlOutcome {
        ok: matches!(status, HitlStatus::Confirmed),
        status,
        confirmed,
        selected_option,
        source: source_label(source).to_string(),
        request_id,
        message: None,
    };

    Ok(ToolCallContent {
        text: serde_json::to_string(&outcome)
            .map_err(|e| ToolSourceError::ExecutionFailed(e.to_string()))?,
    })
}

/// A queue of pre-scripted resolutions for tests, modeled on `MockLlmClient`'s
/// `ScriptedTurn` queue: each call to `resolve` pops the next entry, repeating
/// the last one once the queue is down to one.
pub struct ScriptedHitlResponder {
    resolutions: tokio::sync::Mutex<Vec<HitlResolution>>,
}

impl ScriptedHitlResponder {
    pub fn new(resolutions: Vec<HitlResolution>) -> Self {
        Self {
            resolutions: tokio::sync::Mutex::new(resolutions),
        }
    }

    pub fn always_select(option: impl Into<String>) -> Self {
        Self::new(vec![HitlResolution {
            selected_option: Some(option.into()),
            source: HitlSource::User,
        }])
    }
}

#[async_trait]
impl HitlResponder for ScriptedHitlResponder {
    async fn resolve(&self, _request: &HitlRequest) -> HitlResolution {
        let mut queue = self.resolutions.lock().await;
        if queue.len() > 1 {
            queue.remove(0)
        } else if let Some(last) = queue.last() {
            last.clone()
        } else {
            HitlResolution {
                selected_option: None,
                source: HitlSource::Timeout,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_options_trims_and_dedupes_case_insensitively() {
        let options = vec!["Red".to_string(), "red".to_string(), " Blue ".to_string()];
        assert_eq!(normalize_options(&options), vec!["Red".to_string(), "Blue".to_string()]);
    }

    #[tokio::test]
    async fn confirmed_selection_without_confirmation_step() {
        let responder = ScriptedHitlResponder::always_select("Blue");
        let args = json!({
            "question": "Pick color",
            "options": ["Red", "red", "Blue"],
        });
        let result = run_human_intervention(&args, &responder).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["status"], "confirmed");
        assert_eq!(parsed["selectedOption"], "Blue");
        assert_eq!(parsed["source"], "user");
    }

    #[tokio::test]
    async fn invalid_default_option_is_rejected() {
        let responder = AutoTimeoutResponder;
        let args = json!({
            "question": "Pick",
            "options": ["A", "B"],
            "defaultOption": "C",
        });
        assert!(run_human_intervention(&args, &responder).await.is_err());
    }

    #[tokio::test]
    async fn require_confirmation_runs_second_prompt() {
        let responder = ScriptedHitlResponder::new(vec![
            HitlResolution {
                selected_option: Some("A".into()),
                source: HitlSource::User,
            },
            HitlResolution {
                selected_option: Some("Confirm".into()),
                source: HitlSource::User,
            },
        ]);
        let args = json!({
            "question": "Pick",
            "options": ["A", "B"],
            "requireConfirmation": true,
        });
        let result = run_human_intervention(&args, &responder).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["status"], "confirmed");
        assert_eq!(parsed["confirmed"], true);
    }

    #[tokio::test]
    async fn timeout_with_no_selection_is_canceled() {
        let responder = AutoTimeoutResponder;
        let args = json!({"question": "Pick", "options": ["A", "B"]});
        let result = run_human_intervention(&args, &responder).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result.text).unwrap();
        assert_eq!(parsed["status"], "canceled");
        assert_eq!(parsed["confirmed"], false);
    }
}
