//! Questionnaire reference data.
//!
//! A [`Questionnaire`] is loaded once at startup and shared read-only between
//! quiz runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single multiple-choice question.
///
/// Option order is both the display order and the answer-index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl Question {
    pub fn new(text: impl Into<String>, options: &[&str], correct_index: usize) -> Self {
        Self {
            text: text.into(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
            correct_index,
        }
    }

    /// Position of `option` in this question's option list.
    pub fn position_of(&self, option: &str) -> Option<usize> {
        self.options.iter().position(|o| o == option)
    }

    /// Whether `option` is the correct answer to this question.
    pub fn is_correct(&self, option: &str) -> bool {
        self.position_of(option) == Some(self.correct_index)
    }

    /// Text of the correct option.
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.correct_index).map(String::as_str)
    }
}

/// Validation failures for questionnaire data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionnaireError {
    #[error("question {index} has no options")]
    NoOptions { index: usize },

    #[error("question {index}: correct_index {correct_index} out of range for {len} options")]
    CorrectIndexOutOfRange {
        index: usize,
        correct_index: usize,
        len: usize,
    },
}

/// An ordered, immutable set of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Questionnaire {
    #[serde(default)]
    questions: Vec<Question>,
}

impl Questionnaire {
    /// Build a questionnaire, checking `0 <= correct_index < options.len()`
    /// for every question.
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionnaireError> {
        let questionnaire = Self { questions };
        questionnaire.validate()?;
        Ok(questionnaire)
    }

    /// Check the per-question invariants.
    pub fn validate(&self) -> Result<(), QuestionnaireError> {
        for (index, question) in self.questions.iter().enumerate() {
            if question.options.is_empty() {
                return Err(QuestionnaireError::NoOptions { index });
            }
            if question.correct_index >= question.options.len() {
                return Err(QuestionnaireError::CorrectIndexOutOfRange {
                    index,
                    correct_index: question.correct_index,
                    len: question.options.len(),
                });
            }
        }
        Ok(())
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// The questions shipped with the agent, used when no file is configured.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            questions: vec![
                Question::new("How much is 7 x 8?", &["54", "56", "64", "48"], 1),
                Question::new(
                    "Which planet is closest to the Sun?",
                    &["Venus", "Earth", "Mercury", "Mars"],
                    2,
                ),
                Question::new(
                    "Which word is a verb?",
                    &["quickly", "table", "run", "green"],
                    2,
                ),
                Question::new("How many minutes are in two hours?", &["100", "120", "60"], 1),
                Question::new(
                    "What is the capital of France?",
                    &["Paris", "Madrid", "Rome", "Berlin"],
                    0,
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_questionnaire_is_valid() {
        let q = Questionnaire::builtin();
        assert!(!q.is_empty());
        q.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let err = Questionnaire::new(vec![Question::new("2+2?", &["3", "4"], 2)]).unwrap_err();
        assert_eq!(
            err,
            QuestionnaireError::CorrectIndexOutOfRange {
                index: 0,
                correct_index: 2,
                len: 2
            }
        );
    }

    #[test]
    fn rejects_question_without_options() {
        let err = Questionnaire::new(vec![
            Question::new("ok?", &["yes"], 0),
            Question::new("empty?", &[], 0),
        ])
        .unwrap_err();
        assert_eq!(err, QuestionnaireError::NoOptions { index: 1 });
    }

    #[test]
    fn is_correct_compares_positions() {
        let q = Question::new("Sky color?", &["Red", "Blue"], 1);
        assert!(q.is_correct("Blue"));
        assert!(!q.is_correct("Red"));
        assert!(!q.is_correct("Green"));
        assert_eq!(q.correct_option(), Some("Blue"));
    }

    #[test]
    fn parse_questionnaire_toml() {
        let toml_str = r#"
[[questions]]
text = "2+2?"
options = ["3", "4", "5"]
correct_index = 1

[[questions]]
text = "Sky color?"
options = ["Red", "Blue"]
correct_index = 1
"#;
        let q: Questionnaire = toml::from_str(toml_str).unwrap();
        q.validate().unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.get(1).unwrap().options, vec!["Red", "Blue"]);
    }
}
