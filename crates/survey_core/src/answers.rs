use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use shared::domain::{AnswerMap, AnswerValue};

use crate::questions::{Question, QuestionKind, QuestionSet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("question '{question_id}' expects {expected}, got {actual}")]
    KindMismatch {
        question_id: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("'{option}' is not an option of question '{question_id}'")]
    UnknownOption { question_id: String, option: String },
    #[error("question '{question_id}' expects a YYYY-MM-DD date, got '{value}'")]
    InvalidDate { question_id: String, value: String },
    #[error("question '{0}' needs a non-empty answer")]
    Blank(String),
}

/// Checks that `value` has the shape the question's kind asks for.
pub fn validate_answer(question: &Question, value: &AnswerValue) -> Result<(), AnswerError> {
    let mismatch = |expected: &'static str| AnswerError::KindMismatch {
        question_id: question.id.clone(),
        expected,
        actual: value.type_name(),
    };

    match (question.kind, value) {
        (QuestionKind::SingleChoice, AnswerValue::Single(option)) => {
            ensure_offered(question, option)
        }
        (QuestionKind::MultiChoice, AnswerValue::Multi(options)) => options
            .iter()
            .try_for_each(|option| ensure_offered(question, option)),
        (QuestionKind::Date, AnswerValue::Single(raw)) => {
            let raw = raw.trim();
            let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d");
            if raw.len() != 10 || parsed.is_err() {
                return Err(AnswerError::InvalidDate {
                    question_id: question.id.clone(),
                    value: raw.to_string(),
                });
            }
            Ok(())
        }
        (QuestionKind::FreeText, AnswerValue::Single(text)) => {
            if text.trim().is_empty() {
                return Err(AnswerError::Blank(question.id.clone()));
            }
            Ok(())
        }
        (QuestionKind::MultiChoice, AnswerValue::Single(_)) => Err(mismatch("multiple values")),
        (_, AnswerValue::Multi(_)) => Err(mismatch("a single value")),
    }
}

/// Validates `value` and returns the form that gets stored: multi selections
/// deduplicated in selection order, dates and free text trimmed.
pub fn normalize_answer(
    question: &Question,
    value: AnswerValue,
) -> Result<AnswerValue, AnswerError> {
    validate_answer(question, &value)?;
    Ok(match (question.kind, value) {
        (_, AnswerValue::Multi(options)) => AnswerValue::multi(options),
        (QuestionKind::Date | QuestionKind::FreeText, AnswerValue::Single(raw)) => {
            AnswerValue::Single(raw.trim().to_string())
        }
        (_, value) => value,
    })
}

fn ensure_offered(question: &Question, option: &str) -> Result<(), AnswerError> {
    if question.offers(option) {
        Ok(())
    } else {
        Err(AnswerError::UnknownOption {
            question_id: question.id.clone(),
            option: option.to_string(),
        })
    }
}

/// Checkbox behaviour for multi-choice questions: deselect when already
/// selected, otherwise append in selection order.
pub fn toggle_selection(selection: &[String], option: &str) -> Vec<String> {
    if selection.iter().any(|o| o == option) {
        selection.iter().filter(|o| *o != option).cloned().collect()
    } else {
        let mut next = selection.to_vec();
        next.push(option.to_string());
        next
    }
}

/// Index of the first unanswered question, or the last index once every
/// question has an answer.
pub fn derive_step(questions: &QuestionSet, answers: &AnswerMap) -> usize {
    questions
        .iter()
        .position(|q| !answers.contains(&q.id))
        .unwrap_or_else(|| questions.last_index())
}

/// How bootstrap chooses between the cached and the remote answer map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// The map with more answered keys wins; ties go to the remote map.
    #[default]
    LargerWins,
    /// The more recently written map wins; falls back to `LargerWins` when
    /// either side has no timestamp.
    NewestWins,
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "larger_wins" | "larger" => Ok(Self::LargerWins),
            "newest_wins" | "newest" => Ok(Self::NewestWins),
            other => Err(format!("unknown reconcile policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Local,
    Remote,
}

/// An answer map together with the time it was last written, if known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerSet {
    pub answers: AnswerMap,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnswerSet {
    pub fn new(answers: AnswerMap, updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            answers,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub answers: AnswerMap,
    pub source: AnswerSource,
}

pub fn reconcile(local: AnswerSet, remote: AnswerSet, policy: ReconcilePolicy) -> Reconciled {
    let remote_wins = match (policy, local.updated_at, remote.updated_at) {
        (ReconcilePolicy::NewestWins, Some(local_at), Some(remote_at)) => remote_at >= local_at,
        _ => remote.answers.answered_count() >= local.answers.answered_count(),
    };

    if remote_wins {
        Reconciled {
            answers: remote.answers,
            source: AnswerSource::Remote,
        }
    } else {
        Reconciled {
            answers: local.answers,
            source: AnswerSource::Local,
        }
    }
}

#[cfg(test)]
#[path = "tests/answers_tests.rs"]
mod tests;
