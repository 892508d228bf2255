use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::SessionId,
    error::ServiceError,
    protocol::{
        DraftEmailResponse, HealthResponse, SessionCreateResponse, SessionDetailResponse,
        SurveyPayload,
    },
};
use tracing::{debug, warn};
use url::Url;

/// The remote service that owns survey sessions.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create_session(&self) -> Result<SessionId, ServiceError>;
    async fn fetch_session(&self, session_id: SessionId)
        -> Result<SessionDetailResponse, ServiceError>;
    async fn submit_survey(
        &self,
        session_id: SessionId,
        payload: &SurveyPayload,
    ) -> Result<SessionDetailResponse, ServiceError>;
}

pub struct HttpSessionService {
    http: Client,
    base_url: Url,
}

impl HttpSessionService {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid session service url '{base_url}'"))?;
        // Url::join replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::transport(format!("invalid endpoint '{path}': {e}")))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ServiceError::from_status(status.as_u16(), &body);
            warn!(status = status.as_u16(), kind = ?err.kind, "session service: request failed");
            return Err(err);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::transport(format!("invalid response body: {e}")))
    }

    pub async fn health_check(&self) -> Result<HealthResponse, ServiceError> {
        let url = self.endpoint("")?;
        self.send_json(self.http.get(url)).await
    }

    /// Notification email drafts prepared by the service for a submitted session.
    pub async fn draft_emails(
        &self,
        session_id: SessionId,
    ) -> Result<DraftEmailResponse, ServiceError> {
        let url = self.endpoint(&format!("sessions/{}/draft-emails", session_id.0))?;
        self.send_json(self.http.get(url)).await
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn create_session(&self) -> Result<SessionId, ServiceError> {
        let url = self.endpoint("sessions")?;
        let response: SessionCreateResponse = self.send_json(self.http.post(url)).await?;
        debug!(session_id = response.session_id.0, "session service: session created");
        Ok(response.session_id)
    }

    async fn fetch_session(
        &self,
        session_id: SessionId,
    ) -> Result<SessionDetailResponse, ServiceError> {
        let url = self.endpoint(&format!("sessions/{}", session_id.0))?;
        self.send_json(self.http.get(url)).await
    }

    async fn submit_survey(
        &self,
        session_id: SessionId,
        payload: &SurveyPayload,
    ) -> Result<SessionDetailResponse, ServiceError> {
        let url = self.endpoint(&format!("sessions/{}/survey", session_id.0))?;
        self.send_json(self.http.post(url).json(payload)).await
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
