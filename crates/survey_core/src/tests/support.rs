//! Fakes shared by the unit tests in this crate.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::SessionId,
    error::ServiceError,
    protocol::{SessionDetailResponse, SurveyPayload},
};
use storage::{KeyValueStore, StorageChange, Subscription};
use tokio::sync::{broadcast, Mutex, Notify};

use crate::service::SessionService;

/// A store whose every operation fails.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Err(anyhow!("read of '{key}' failed: disk unavailable"))
    }

    async fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("write of '{key}' failed: disk unavailable"))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        Err(anyhow!("remove of '{key}' failed: disk unavailable"))
    }

    fn subscribe(&self, key: &str) -> Subscription {
        let (_tx, rx) = broadcast::channel::<StorageChange>(1);
        Subscription::new(key, rx)
    }
}

/// Scripted session service. Unscripted fetches return the stored detail for
/// known sessions and `NotFound` otherwise; unscripted submits succeed.
pub struct FakeSessionService {
    next_id: AtomicI64,
    sessions: Mutex<Vec<SessionDetailResponse>>,
    create_failures: Mutex<VecDeque<ServiceError>>,
    fetch_failures: Mutex<VecDeque<ServiceError>>,
    submit_failures: Mutex<VecDeque<ServiceError>>,
    pub submitted: Mutex<Vec<(SessionId, SurveyPayload)>>,
    pub created: Mutex<Vec<SessionId>>,
    submit_gate: Mutex<Option<Arc<Notify>>>,
    pub submit_started: Arc<Notify>,
}

impl FakeSessionService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            sessions: Mutex::new(Vec::new()),
            create_failures: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            submit_failures: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            submit_gate: Mutex::new(None),
            submit_started: Arc::new(Notify::new()),
        }
    }

    pub async fn insert_session(&self, detail: SessionDetailResponse) {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|s| s.session_id != detail.session_id);
        sessions.push(detail);
    }

    pub async fn fail_next_create(&self, err: ServiceError) {
        self.create_failures.lock().await.push_back(err);
    }

    pub async fn fail_next_fetch(&self, err: ServiceError) {
        self.fetch_failures.lock().await.push_back(err);
    }

    pub async fn fail_next_submit(&self, err: ServiceError) {
        self.submit_failures.lock().await.push_back(err);
    }

    /// Makes the next submit wait until the returned handle is notified.
    pub async fn hold_next_submit(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.submit_gate.lock().await = Some(gate.clone());
        gate
    }
}

pub fn empty_detail(session_id: SessionId) -> SessionDetailResponse {
    SessionDetailResponse {
        session_id,
        survey_data: None,
        completed_at: None,
        created_at: Some(Utc::now().to_rfc3339()),
        updated_at: None,
    }
}

#[async_trait]
impl SessionService for FakeSessionService {
    async fn create_session(&self) -> Result<SessionId, ServiceError> {
        if let Some(err) = self.create_failures.lock().await.pop_front() {
            return Err(err);
        }
        let session_id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions.lock().await.push(empty_detail(session_id));
        self.created.lock().await.push(session_id);
        Ok(session_id)
    }

    async fn fetch_session(
        &self,
        session_id: SessionId,
    ) -> Result<SessionDetailResponse, ServiceError> {
        if let Some(err) = self.fetch_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.sessions
            .lock()
            .await
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned()
            .ok_or_else(|| ServiceError::from_status(404, "Session not found"))
    }

    async fn submit_survey(
        &self,
        session_id: SessionId,
        payload: &SurveyPayload,
    ) -> Result<SessionDetailResponse, ServiceError> {
        self.submit_started.notify_one();
        let gate = self.submit_gate.lock().await.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.submit_failures.lock().await.pop_front() {
            return Err(err);
        }

        let mut sessions = self.sessions.lock().await;
        let Some(detail) = sessions.iter_mut().find(|s| s.session_id == session_id) else {
            return Err(ServiceError::from_status(404, "Session not found"));
        };
        let now = Utc::now().to_rfc3339();
        detail.survey_data = Some(payload.clone());
        detail.completed_at = Some(now.clone());
        detail.updated_at = Some(now);
        let detail = detail.clone();
        drop(sessions);

        self.submitted.lock().await.push((session_id, payload.clone()));
        Ok(detail)
    }
}
