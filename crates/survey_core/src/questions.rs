use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiChoice,
    Date,
    FreeText,
}

impl QuestionKind {
    pub fn has_options(self) -> bool {
        matches!(self, Self::SingleChoice | Self::MultiChoice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub required: bool,
}

impl Question {
    fn build<I, T>(id: &str, prompt: &str, kind: QuestionKind, options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            kind,
            options: options.into_iter().map(Into::into).collect(),
            required: true,
        }
    }

    pub fn single_choice<I, T>(id: &str, prompt: &str, options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(id, prompt, QuestionKind::SingleChoice, options)
    }

    pub fn multi_choice<I, T>(id: &str, prompt: &str, options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(id, prompt, QuestionKind::MultiChoice, options)
    }

    pub fn date(id: &str, prompt: &str) -> Self {
        Self::build(id, prompt, QuestionKind::Date, Vec::<String>::new())
    }

    pub fn free_text(id: &str, prompt: &str) -> Self {
        Self::build(id, prompt, QuestionKind::FreeText, Vec::<String>::new())
    }

    /// Marks the question as skippable.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn offers(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionSetError {
    #[error("a survey needs at least one question")]
    Empty,
    #[error("question id '{0}' is used more than once")]
    DuplicateId(String),
    #[error("choice question '{0}' has no options")]
    MissingOptions(String),
    #[error("question '{0}' does not take options")]
    UnexpectedOptions(String),
}

/// The fixed, ordered question sequence. Position in the set is the step index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionSetError> {
        if questions.is_empty() {
            return Err(QuestionSetError::Empty);
        }

        let mut seen = HashSet::new();
        for question in &questions {
            if !seen.insert(question.id.as_str()) {
                return Err(QuestionSetError::DuplicateId(question.id.clone()));
            }
            match (question.kind.has_options(), question.options.is_empty()) {
                (true, true) => return Err(QuestionSetError::MissingOptions(question.id.clone())),
                (false, false) => {
                    return Err(QuestionSetError::UnexpectedOptions(question.id.clone()))
                }
                _ => {}
            }
        }

        Ok(Self { questions })
    }

    /// The bereavement survey shown to every new session.
    pub fn afterversed() -> Self {
        Self {
            questions: afterversed_questions(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<&Question> {
        self.questions.get(step)
    }

    pub fn find(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    pub fn last_index(&self) -> usize {
        self.questions.len().saturating_sub(1)
    }

    pub fn is_last(&self, step: usize) -> bool {
        step >= self.last_index()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }

    /// Share of the survey reached when `step` is on screen, in percent.
    pub fn progress_percent(&self, step: usize) -> f32 {
        if self.questions.is_empty() {
            return 0.0;
        }
        let shown = step.min(self.last_index()) + 1;
        shown as f32 / self.questions.len() as f32 * 100.0
    }
}

pub(crate) fn afterversed_questions() -> Vec<Question> {
    vec![
        Question::single_choice(
            "where_you_are",
            "Just to help us understand where you are in this journey, which of these feels closest to where you are?",
            [
                "This loss is very recent (in the last few days).",
                "It has been a week or two.",
                "It has been a few weeks or more.",
                "I'd rather not say.",
            ],
        ),
        Question::date(
            "date_of_passing",
            "If you feel able to, when did they pass away?",
        )
        .optional(),
        Question::single_choice(
            "overwhelming",
            "This whole process can feel like a fog. What is the one thing that feels most overwhelming to you right now?",
            [
                "Just knowing where to start",
                "Arranging the funeral",
                "Dealing with money and bank accounts",
                "The legal paperwork (like a Will)",
                "Telling all the different companies",
                "All of the above, and I feel stuck",
                "Something else",
            ],
        ),
        Question::multi_choice(
            "todo_list",
            "We know the list of people to contact can feel endless. We can help you build a clear, simple checklist.\n\nWhich of these areas are on your mind? (Select any that apply)",
            [
                "Household: (Council Tax, Gas, Electricity, Water)",
                "Money: (Bank Accounts, Credit Cards, Pensions, Insurance)",
                "Digital: (Email, Social Media, Subscriptions like Netflix)",
                "Personal: (Doctor, Dentist, Employer)",
                "I don't know where to start, and that's okay",
            ],
        )
        .optional(),
        Question::single_choice(
            "death_certificate",
            "These are often the first big steps. We can guide you on what to do for each one.\n\n1. The Death Certificate",
            [
                "We've registered it and have copies.",
                "We've registered it but are waiting for copies.",
                "We haven't been able to do this yet.",
                "I'm not sure about this.",
            ],
        ),
        Question::single_choice(
            "the_will",
            "2. The Will",
            [
                "We have found the Will and know who the Executor is.",
                "We think there is a Will, but we haven't found it yet.",
                "We don't think there is a Will.",
                "I'm not sure, and it's stressful to think about.",
            ],
        ),
        Question::single_choice(
            "digital_world",
            "In today's world, our loved ones also leave behind a digital life. Are you worried about any of the following?",
            [
                "Their social media accounts (like Facebook)",
                "Their personal email",
                "Photos or videos stored on a phone or computer",
                "This isn't a priority for me right now.",
            ],
        ),
        Question::single_choice(
            "protecting_memories",
            "When the time is right, many people find comfort in gathering memories.\n\nIs protecting and perhaps one day sharing memories (like photos, stories, or videos) something you might be interested in?",
            [
                "Yes, that sounds like a lovely idea.",
                "Maybe, but not right now.",
                "I'm not sure.",
            ],
        ),
    ]
}

#[cfg(test)]
#[path = "tests/questions_tests.rs"]
mod tests;
