use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnswerMap, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateResponse {
    pub session_id: SessionId,
}

/// Body of `POST /sessions/{id}/survey`, stored verbatim as `survey_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPayload {
    pub answers: AnswerMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SurveyPayload {
    pub fn new(answers: AnswerMap, timestamp: DateTime<Utc>) -> Self {
        Self {
            answers,
            timestamp: Some(timestamp.to_rfc3339()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_service_timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetailResponse {
    pub session_id: SessionId,
    #[serde(default)]
    pub survey_data: Option<SurveyPayload>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionDetailResponse {
    pub fn completed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.completed_at.as_deref().and_then(parse_service_timestamp)
    }

    pub fn answers(&self) -> AnswerMap {
        self.survey_data
            .as_ref()
            .map(|data| data.answers.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEmailResponse {
    pub drafts: Vec<serde_json::Value>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Accepts RFC 3339 as well as the bare `YYYY-MM-DD HH:MM:SS` form sqlite
/// uses for `CURRENT_TIMESTAMP` defaults (interpreted as UTC).
pub fn parse_service_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
