use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{AnswerMap, AnswerValue, SessionId},
    protocol::SurveyPayload,
};
use storage::KeyValueStore;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::{
    answers::{
        derive_step, normalize_answer, reconcile, toggle_selection, AnswerError, AnswerSet,
        AnswerSource, ReconcilePolicy,
    },
    cache::{CachedSurveyState, SurveyCache},
    questions::{QuestionKind, QuestionSet},
    service::SessionService,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyPhase {
    Loading,
    InProgress,
    Submitting,
    Completed,
}

/// Why an operation was ignored. Ignored calls change nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardReason {
    Loading,
    Submitting,
    NoSession,
    Completed,
    NotCompleted,
    Detached,
    Unanswered,
    Required,
    WrongKind,
    /// The current step has no question behind it.
    NoQuestion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    Ignored(GuardReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed { completed_at: DateTime<Utc> },
    /// The service no longer knows the session; the user has to refresh.
    SessionExpired,
    /// Retryable failure. Answers are still held locally.
    Failed { message: String },
    NoSession,
    Ignored(GuardReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Moved(usize),
    Submitted(SubmitOutcome),
    Ignored(GuardReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOutcome {
    Moved(usize),
    /// Already on the first question; the caller should leave the survey.
    ExitSurvey,
    Ignored(GuardReason),
}

/// Notices for the presentation layer. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Ready(ControllerSnapshot),
    Offline { message: String },
    SessionReplaced { stale: SessionId, fresh: SessionId },
    SessionUnavailable { message: String },
    Submitted { completed_at: DateTime<Utc> },
    SessionExpired,
    SubmissionFailed { message: String },
    MissingSession,
}

impl ControllerEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::SessionUnavailable { .. }
                | Self::SessionExpired
                | Self::SubmissionFailed { .. }
                | Self::MissingSession
        )
    }

    /// Short user-facing text, for events that warrant a toast.
    pub fn toast_message(&self) -> Option<String> {
        match self {
            Self::Ready(_) => None,
            Self::Offline { .. } => Some(
                "You appear to be offline. Your answers are saved on this device.".to_string(),
            ),
            Self::SessionReplaced { .. } => {
                Some("Your previous session has expired, so we've started a new one.".to_string())
            }
            Self::SessionUnavailable { .. } => Some(
                "We couldn't start a session right now. Please refresh and try again.".to_string(),
            ),
            Self::Submitted { .. } => Some("Thank you. Your answers have been saved.".to_string()),
            Self::SessionExpired => {
                Some("Your session has expired. Please refresh the page to continue.".to_string())
            }
            Self::SubmissionFailed { .. } => Some(
                "We couldn't save your answers. They are kept on this device, please try again."
                    .to_string(),
            ),
            Self::MissingSession => {
                Some("No session is available yet. Please refresh and try again.".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub phase: SurveyPhase,
    pub session_id: Option<SessionId>,
    pub answers: AnswerMap,
    pub current_step: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub pending_selection: Vec<String>,
}

struct ControllerState {
    phase: SurveyPhase,
    session_id: Option<SessionId>,
    answers: AnswerMap,
    current_step: usize,
    completed_at: Option<DateTime<Utc>>,
    pending_selection: Vec<String>,
}

impl ControllerState {
    fn loading() -> Self {
        Self {
            phase: SurveyPhase::Loading,
            session_id: None,
            answers: AnswerMap::new(),
            current_step: 0,
            completed_at: None,
            pending_selection: Vec::new(),
        }
    }

    /// Shared guard for record/advance/skip.
    fn mutation_guard(&self) -> Option<GuardReason> {
        match self.phase {
            SurveyPhase::Loading => Some(GuardReason::Loading),
            SurveyPhase::Submitting => Some(GuardReason::Submitting),
            SurveyPhase::Completed => Some(GuardReason::Completed),
            SurveyPhase::InProgress if self.session_id.is_none() => Some(GuardReason::NoSession),
            SurveyPhase::InProgress if self.completed_at.is_some() => Some(GuardReason::Completed),
            SurveyPhase::InProgress => None,
        }
    }

    fn cache_record(&self) -> Option<CachedSurveyState> {
        Some(CachedSurveyState {
            session_id: self.session_id?,
            answers: self.answers.clone(),
            current_step: self.current_step,
            completed_at: self.completed_at,
            updated_at: Utc::now(),
        })
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            phase: self.phase,
            session_id: self.session_id,
            answers: self.answers.clone(),
            current_step: self.current_step,
            completed_at: self.completed_at,
            pending_selection: self.pending_selection.clone(),
        }
    }
}

/// Result of the network half of bootstrap, applied to state in one step.
struct Resolution {
    session_id: Option<SessionId>,
    answers: AnswerMap,
    completed_at: Option<DateTime<Utc>>,
    events: Vec<ControllerEvent>,
}

/// Drives one visit to the survey: resolves the session, reconciles cached
/// and remote answers, pages through the questions and submits.
pub struct SurveyController<S, K>
where
    S: SessionService + ?Sized,
    K: KeyValueStore + ?Sized,
{
    service: Arc<S>,
    cache: SurveyCache<K>,
    questions: QuestionSet,
    policy: ReconcilePolicy,
    inner: Mutex<ControllerState>,
    alive: AtomicBool,
    events: broadcast::Sender<ControllerEvent>,
}

impl<S, K> SurveyController<S, K>
where
    S: SessionService + ?Sized,
    K: KeyValueStore + ?Sized,
{
    pub fn new(service: Arc<S>, store: Arc<K>, questions: QuestionSet) -> Arc<Self> {
        Self::new_with_policy(service, store, questions, ReconcilePolicy::default())
    }

    pub fn new_with_policy(
        service: Arc<S>,
        store: Arc<K>,
        questions: QuestionSet,
        policy: ReconcilePolicy,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            service,
            cache: SurveyCache::new(store),
            questions,
            policy,
            inner: Mutex::new(ControllerState::loading()),
            alive: AtomicBool::new(true),
            events,
        })
    }

    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Stops the controller from applying any further results, including
    /// those of requests already in flight.
    pub fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    async fn persist(&self, state: &ControllerState) {
        if let Some(record) = state.cache_record() {
            self.cache.store_state(&record).await;
        }
    }

    pub async fn bootstrap(&self) -> ControllerSnapshot {
        {
            let mut guard = self.inner.lock().await;
            guard.phase = SurveyPhase::Loading;
        }

        let resolution = self.resolve_session().await;

        let mut guard = self.inner.lock().await;
        if !self.is_attached() {
            return guard.snapshot();
        }

        guard.session_id = resolution.session_id;
        guard.answers = resolution.answers;
        guard.completed_at = resolution.completed_at;
        guard.current_step = derive_step(&self.questions, &guard.answers);
        guard.pending_selection.clear();
        guard.phase = if guard.completed_at.is_some() {
            SurveyPhase::Completed
        } else {
            SurveyPhase::InProgress
        };

        info!(
            session_id = guard.session_id.map(|id| id.0),
            answered = guard.answers.answered_count(),
            current_step = guard.current_step,
            completed = guard.completed_at.is_some(),
            "survey: bootstrap resolved"
        );

        let snapshot = guard.snapshot();
        drop(guard);
        for event in resolution.events {
            self.emit(event);
        }
        self.emit(ControllerEvent::Ready(snapshot.clone()));
        snapshot
    }

    async fn resolve_session(&self) -> Resolution {
        let mut events = Vec::new();

        let session_id = match self.cache.load_session_id().await {
            Some(session_id) => Some(session_id),
            None => self.create_session(&mut events).await,
        };
        let Some(session_id) = session_id else {
            return Resolution {
                session_id: None,
                answers: AnswerMap::new(),
                completed_at: None,
                events,
            };
        };

        let cached = self.cache.load_state(session_id).await;
        let local_completed_at = cached.as_ref().and_then(|state| state.completed_at);
        let local = cached
            .map(|state| AnswerSet::new(state.answers, Some(state.updated_at)))
            .unwrap_or_default();

        match self.service.fetch_session(session_id).await {
            Ok(detail) => {
                let remote_updated_at = detail
                    .survey_data
                    .as_ref()
                    .and_then(|data| data.submitted_at());
                let remote = AnswerSet::new(detail.answers(), remote_updated_at);
                let reconciled = reconcile(local, remote, self.policy);
                if reconciled.source == AnswerSource::Remote {
                    info!(session_id = session_id.0, "survey: using remote answers");
                }
                Resolution {
                    session_id: Some(session_id),
                    answers: reconciled.answers,
                    completed_at: detail.completed_at_utc().or(local_completed_at),
                    events,
                }
            }
            Err(err) if err.is_not_found() => {
                warn!(
                    session_id = session_id.0,
                    error = %err,
                    "survey: cached session no longer exists, starting over"
                );
                self.cache.clear_state().await;
                self.cache.clear_session_id().await;
                let fresh = self.create_session(&mut events).await;
                if let Some(fresh) = fresh {
                    events.push(ControllerEvent::SessionReplaced {
                        stale: session_id,
                        fresh,
                    });
                }
                Resolution {
                    session_id: fresh,
                    answers: AnswerMap::new(),
                    completed_at: None,
                    events,
                }
            }
            Err(err) => {
                warn!(
                    session_id = session_id.0,
                    error = %err,
                    "survey: session fetch failed, continuing offline"
                );
                events.push(ControllerEvent::Offline {
                    message: err.message,
                });
                Resolution {
                    session_id: Some(session_id),
                    answers: local.answers,
                    completed_at: local_completed_at,
                    events,
                }
            }
        }
    }

    async fn create_session(&self, events: &mut Vec<ControllerEvent>) -> Option<SessionId> {
        match self.service.create_session().await {
            Ok(session_id) => {
                info!(session_id = session_id.0, "survey: session created");
                self.cache.store_session_id(session_id).await;
                Some(session_id)
            }
            Err(err) => {
                warn!(error = %err, "survey: failed to create session");
                events.push(ControllerEvent::SessionUnavailable {
                    message: err.message,
                });
                None
            }
        }
    }

    pub async fn record_answer(
        &self,
        question_id: &str,
        value: AnswerValue,
    ) -> Result<RecordOutcome, AnswerError> {
        let mut guard = self.inner.lock().await;
        if let Some(reason) = self.guard_mutation(&guard) {
            return Ok(RecordOutcome::Ignored(reason));
        }

        let question = self
            .questions
            .find(question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion(question_id.to_string()))?;
        let value = normalize_answer(question, value)?;

        guard.answers = guard.answers.with_answer(question_id, value);
        self.persist(&guard).await;
        Ok(RecordOutcome::Recorded)
    }

    /// Answers the current question and moves on, as a click on a choice does.
    pub async fn answer_current(&self, value: AnswerValue) -> Result<StepOutcome, AnswerError> {
        let question_id = {
            let guard = self.inner.lock().await;
            if let Some(reason) = self.guard_mutation(&guard) {
                return Ok(StepOutcome::Ignored(reason));
            }
            match self.questions.get(guard.current_step) {
                Some(question) => question.id.clone(),
                None => return Ok(StepOutcome::Ignored(GuardReason::NoQuestion)),
            }
        };

        match self.record_answer(&question_id, value).await? {
            RecordOutcome::Recorded => Ok(self.advance().await),
            RecordOutcome::Ignored(reason) => Ok(StepOutcome::Ignored(reason)),
        }
    }

    pub async fn select_option(&self, option: &str) -> Result<StepOutcome, AnswerError> {
        self.answer_current(AnswerValue::Single(option.to_string()))
            .await
    }

    /// Toggles `option` in the pending selection of the current multi-choice
    /// question and returns the selection.
    pub async fn toggle_option(&self, option: &str) -> Result<Vec<String>, AnswerError> {
        let mut guard = self.inner.lock().await;
        if self.guard_mutation(&guard).is_some() {
            return Ok(guard.pending_selection.clone());
        }
        let Some(question) = self.questions.get(guard.current_step) else {
            return Ok(guard.pending_selection.clone());
        };
        if question.kind != QuestionKind::MultiChoice {
            return Err(AnswerError::KindMismatch {
                question_id: question.id.clone(),
                expected: "a single value",
                actual: "multiple values",
            });
        }
        if !question.offers(option) {
            return Err(AnswerError::UnknownOption {
                question_id: question.id.clone(),
                option: option.to_string(),
            });
        }

        guard.pending_selection = toggle_selection(&guard.pending_selection, option);
        Ok(guard.pending_selection.clone())
    }

    /// Records the pending multi-choice selection and moves on.
    pub async fn confirm_selection(&self) -> Result<StepOutcome, AnswerError> {
        let selection = {
            let guard = self.inner.lock().await;
            if let Some(reason) = self.guard_mutation(&guard) {
                return Ok(StepOutcome::Ignored(reason));
            }
            let is_multi = self
                .questions
                .get(guard.current_step)
                .is_some_and(|q| q.kind == QuestionKind::MultiChoice);
            if !is_multi {
                return Ok(StepOutcome::Ignored(GuardReason::WrongKind));
            }
            guard.pending_selection.clone()
        };

        let outcome = self.answer_current(AnswerValue::multi(selection)).await?;
        if !matches!(outcome, StepOutcome::Ignored(_)) {
            self.inner.lock().await.pending_selection.clear();
        }
        Ok(outcome)
    }

    pub async fn advance(&self) -> StepOutcome {
        let guard = self.inner.lock().await;
        if let Some(reason) = self.guard_mutation(&guard) {
            return StepOutcome::Ignored(reason);
        }
        let answered = self
            .questions
            .get(guard.current_step)
            .is_some_and(|q| guard.answers.contains(&q.id));
        if !answered {
            return StepOutcome::Ignored(GuardReason::Unanswered);
        }
        self.page_forward(guard).await
    }

    pub async fn skip(&self) -> StepOutcome {
        let guard = self.inner.lock().await;
        if let Some(reason) = self.guard_mutation(&guard) {
            return StepOutcome::Ignored(reason);
        }
        let required = self
            .questions
            .get(guard.current_step)
            .map_or(true, |q| q.required);
        if required {
            return StepOutcome::Ignored(GuardReason::Required);
        }
        self.page_forward(guard).await
    }

    async fn page_forward(&self, mut guard: MutexGuard<'_, ControllerState>) -> StepOutcome {
        if self.questions.is_last(guard.current_step) {
            drop(guard);
            return StepOutcome::Submitted(self.submit(None).await);
        }

        guard.current_step += 1;
        guard.pending_selection.clear();
        self.persist(&guard).await;
        StepOutcome::Moved(guard.current_step)
    }

    pub async fn back(&self) -> BackOutcome {
        let mut guard = self.inner.lock().await;
        if !self.is_attached() {
            return BackOutcome::Ignored(GuardReason::Detached);
        }
        match guard.phase {
            SurveyPhase::Loading => return BackOutcome::Ignored(GuardReason::Loading),
            SurveyPhase::Submitting => return BackOutcome::Ignored(GuardReason::Submitting),
            SurveyPhase::InProgress | SurveyPhase::Completed => {}
        }
        if guard.current_step == 0 {
            return BackOutcome::ExitSurvey;
        }

        guard.current_step -= 1;
        guard.pending_selection.clear();
        self.persist(&guard).await;
        BackOutcome::Moved(guard.current_step)
    }

    /// Submits `answers`, or the working answers when `None`.
    pub async fn submit(&self, answers: Option<AnswerMap>) -> SubmitOutcome {
        let (session_id, answers) = {
            let mut guard = self.inner.lock().await;
            if !self.is_attached() {
                return SubmitOutcome::Ignored(GuardReason::Detached);
            }
            match guard.phase {
                SurveyPhase::Loading => return SubmitOutcome::Ignored(GuardReason::Loading),
                SurveyPhase::Submitting => return SubmitOutcome::Ignored(GuardReason::Submitting),
                SurveyPhase::Completed => return SubmitOutcome::Ignored(GuardReason::Completed),
                SurveyPhase::InProgress => {}
            }
            let Some(session_id) = guard.session_id else {
                drop(guard);
                warn!("survey: submit attempted without a session");
                self.emit(ControllerEvent::MissingSession);
                return SubmitOutcome::NoSession;
            };
            guard.phase = SurveyPhase::Submitting;
            (
                session_id,
                answers.unwrap_or_else(|| guard.answers.clone()),
            )
        };

        let payload = SurveyPayload::new(answers.clone(), Utc::now());
        let result = self.service.submit_survey(session_id, &payload).await;

        let mut guard = self.inner.lock().await;
        if !self.is_attached() {
            return SubmitOutcome::Ignored(GuardReason::Detached);
        }

        match result {
            Ok(_) => {
                let completed_at = Utc::now();
                guard.answers = answers;
                guard.completed_at = Some(completed_at);
                guard.current_step = self.questions.last_index();
                guard.pending_selection.clear();
                guard.phase = SurveyPhase::Completed;
                self.persist(&guard).await;
                drop(guard);
                info!(session_id = session_id.0, "survey: answers submitted");
                self.emit(ControllerEvent::Submitted { completed_at });
                SubmitOutcome::Completed { completed_at }
            }
            Err(err) if err.is_not_found() => {
                guard.phase = SurveyPhase::InProgress;
                drop(guard);
                warn!(session_id = session_id.0, error = %err, "survey: session expired on submit");
                self.emit(ControllerEvent::SessionExpired);
                SubmitOutcome::SessionExpired
            }
            Err(err) => {
                guard.phase = SurveyPhase::InProgress;
                drop(guard);
                warn!(session_id = session_id.0, error = %err, "survey: submit failed");
                self.emit(ControllerEvent::SubmissionFailed {
                    message: err.message.clone(),
                });
                SubmitOutcome::Failed {
                    message: err.message,
                }
            }
        }
    }

    /// Re-opens a completed survey for editing, keeping its answers.
    pub async fn reopen(&self) -> StepOutcome {
        let mut guard = self.inner.lock().await;
        if !self.is_attached() {
            return StepOutcome::Ignored(GuardReason::Detached);
        }
        if guard.phase != SurveyPhase::Completed {
            return StepOutcome::Ignored(GuardReason::NotCompleted);
        }

        guard.completed_at = None;
        guard.current_step = 0;
        guard.pending_selection.clear();
        guard.phase = SurveyPhase::InProgress;
        self.persist(&guard).await;
        StepOutcome::Moved(0)
    }

    fn guard_mutation(&self, state: &ControllerState) -> Option<GuardReason> {
        if !self.is_attached() {
            return Some(GuardReason::Detached);
        }
        state.mutation_guard()
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
