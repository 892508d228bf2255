//! Client side of the Afterversed bereavement survey: the question catalogue,
//! answer bookkeeping, the local survey cache, the session service client and
//! the controller that ties them together.

pub mod answers;
pub mod cache;
pub mod config;
pub mod controller;
pub mod progress;
pub mod questions;
pub mod service;

pub use answers::{AnswerError, AnswerMap, AnswerValue, ReconcilePolicy};
pub use cache::{CachedSurveyState, SurveyCache};
pub use config::{load_settings, ClientSettings};
pub use controller::{
    BackOutcome, ControllerEvent, ControllerSnapshot, GuardReason, RecordOutcome, StepOutcome,
    SubmitOutcome, SurveyController, SurveyPhase,
};
pub use progress::TaskProgress;
pub use questions::{Question, QuestionKind, QuestionSet, QuestionSetError};
pub use service::{HttpSessionService, SessionService};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
