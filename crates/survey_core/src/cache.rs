use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{AnswerMap, SessionId};
use storage::KeyValueStore;
use tracing::warn;

pub const SESSION_STORAGE_KEY: &str = "afterversed.sessionId";
pub const SURVEY_STATE_STORAGE_KEY: &str = "afterversed.surveyState";

/// The survey record kept under [`SURVEY_STATE_STORAGE_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSurveyState {
    pub session_id: SessionId,
    pub answers: AnswerMap,
    pub current_step: usize,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Best-effort cache of the session id and survey progress. Read failures and
/// unparseable entries are treated as misses; write failures are logged and
/// swallowed.
pub struct SurveyCache<K: KeyValueStore + ?Sized> {
    store: Arc<K>,
}

impl<K: KeyValueStore + ?Sized> Clone for SurveyCache<K> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K: KeyValueStore + ?Sized> SurveyCache<K> {
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<K> {
        &self.store
    }

    pub async fn load_session_id(&self) -> Option<SessionId> {
        let raw = self.read(SESSION_STORAGE_KEY).await?;
        let parsed = parse_session_id(&raw);
        if parsed.is_none() {
            warn!(raw = %raw, "cache: ignoring invalid cached session id");
        }
        parsed
    }

    pub async fn store_session_id(&self, session_id: SessionId) {
        self.write(SESSION_STORAGE_KEY, &session_id.0.to_string())
            .await;
    }

    pub async fn clear_session_id(&self) {
        self.delete(SESSION_STORAGE_KEY).await;
    }

    /// Loads the cached survey record for `session_id`. Records written for a
    /// different session, or that no longer parse, are dropped from the cache.
    pub async fn load_state(&self, session_id: SessionId) -> Option<CachedSurveyState> {
        let raw = self.read(SURVEY_STATE_STORAGE_KEY).await?;
        let state = match serde_json::from_str::<CachedSurveyState>(&raw) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "cache: discarding unparseable survey state");
                self.delete(SURVEY_STATE_STORAGE_KEY).await;
                return None;
            }
        };

        if state.session_id != session_id {
            warn!(
                cached_session_id = state.session_id.0,
                session_id = session_id.0,
                "cache: discarding survey state for another session"
            );
            self.delete(SURVEY_STATE_STORAGE_KEY).await;
            return None;
        }

        Some(state)
    }

    pub async fn store_state(&self, state: &CachedSurveyState) {
        match serde_json::to_string(state) {
            Ok(raw) => self.write(SURVEY_STATE_STORAGE_KEY, &raw).await,
            Err(err) => warn!(error = %err, "cache: failed to encode survey state"),
        }
    }

    pub async fn clear_state(&self) {
        self.delete(SURVEY_STATE_STORAGE_KEY).await;
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache: read failed, treating as miss");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value).await {
            warn!(key, error = %err, "cache: write failed");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(err) = self.store.remove(key).await {
            warn!(key, error = %err, "cache: remove failed");
        }
    }
}

/// Cached ids are string-encoded positive integers.
pub fn parse_session_id(raw: &str) -> Option<SessionId> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(SessionId)
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
