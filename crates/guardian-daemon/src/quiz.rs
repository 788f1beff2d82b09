//! Quiz state machine.
//!
//! A [`QuizRun`] walks a shared [`Questionnaire`] one question at a time.
//! Answers are matched by option text; an answer that is not one of the
//! current question's options is simply wrong. There is no going back.

use std::sync::Arc;

use guardian_types::{Question, Questionnaire};

/// Where a quiz run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    /// Waiting for an answer to the question at this index.
    AwaitingAnswer(usize),
    /// Every question was answered.
    Complete { score: usize },
}

/// One pass through the questionnaire.
#[derive(Debug, Clone)]
pub struct QuizRun {
    questionnaire: Arc<Questionnaire>,
    current: usize,
    correct: usize,
}

impl QuizRun {
    /// Start at question 0 with no correct answers.
    pub fn start(questionnaire: Arc<Questionnaire>) -> Self {
        Self {
            questionnaire,
            current: 0,
            correct: 0,
        }
    }

    /// Answer the current question and advance.
    ///
    /// Ignored once the run is complete.
    pub fn submit_answer(&mut self, option: &str) -> QuizState {
        if let Some(question) = self.current_question() {
            if question.is_correct(option) {
                self.correct += 1;
            }
            self.current += 1;
        }
        self.state()
    }

    pub fn state(&self) -> QuizState {
        if self.is_complete() {
            QuizState::Complete {
                score: self.correct,
            }
        } else {
            QuizState::AwaitingAnswer(self.current)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.questionnaire.len()
    }

    /// Number of correct answers so far.
    pub fn score(&self) -> usize {
        self.correct
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The question awaiting an answer, or `None` once complete.
    pub fn current_question(&self) -> Option<&Question> {
        self.questionnaire.get(self.current)
    }

    pub fn total(&self) -> usize {
        self.questionnaire.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_questions() -> Arc<Questionnaire> {
        Arc::new(
            Questionnaire::new(vec![
                Question::new("2+2?", &["3", "4"], 1),
                Question::new("Sky color?", &["Blue", "Red"], 0),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn scenario_one_right_one_wrong() {
        let mut quiz = QuizRun::start(two_questions());
        assert_eq!(quiz.state(), QuizState::AwaitingAnswer(0));
        assert_eq!(quiz.current_question().unwrap().text, "2+2?");

        assert_eq!(quiz.submit_answer("4"), QuizState::AwaitingAnswer(1));
        assert_eq!(quiz.submit_answer("Red"), QuizState::Complete { score: 1 });
        assert!(quiz.is_complete());
        assert_eq!(quiz.score(), 1);
        assert!(quiz.current_question().is_none());
    }

    #[test]
    fn right_then_wrong_scores_one_of_two() {
        let questionnaire = Arc::new(
            Questionnaire::new(vec![
                Question::new("2+2?", &["3", "4", "5"], 1),
                Question::new("Sky?", &["Red", "Blue"], 1),
            ])
            .unwrap(),
        );
        let mut quiz = QuizRun::start(questionnaire);
        assert_eq!(quiz.total(), 2);

        assert_eq!(quiz.submit_answer("4"), QuizState::AwaitingAnswer(1));
        assert_eq!(quiz.submit_answer("Red"), QuizState::Complete { score: 1 });
        assert_eq!(quiz.score(), 1);
    }

    #[test]
    fn all_correct_scores_every_question() {
        let mut quiz = QuizRun::start(two_questions());
        quiz.submit_answer("4");
        assert_eq!(quiz.submit_answer("Blue"), QuizState::Complete { score: 2 });
    }

    #[test]
    fn unknown_option_advances_without_scoring() {
        let mut quiz = QuizRun::start(two_questions());
        assert_eq!(quiz.submit_answer("banana"), QuizState::AwaitingAnswer(1));
        assert_eq!(quiz.score(), 0);
        // An option of a different question does not count either.
        assert_eq!(quiz.submit_answer("4"), QuizState::Complete { score: 0 });
    }

    #[test]
    fn submissions_after_complete_are_ignored() {
        let mut quiz = QuizRun::start(two_questions());
        quiz.submit_answer("4");
        quiz.submit_answer("Blue");
        assert_eq!(quiz.submit_answer("4"), QuizState::Complete { score: 2 });
        assert_eq!(quiz.current_index(), 2);
        assert_eq!(quiz.score(), 2);
    }

    #[test]
    fn empty_questionnaire_is_complete_at_start() {
        let quiz = QuizRun::start(Arc::new(Questionnaire::new(Vec::new()).unwrap()));
        assert!(quiz.is_complete());
        assert_eq!(quiz.state(), QuizState::Complete { score: 0 });
    }

    #[test]
    fn n_submissions_complete_builtin() {
        let questionnaire = Arc::new(Questionnaire::builtin());
        let mut quiz = QuizRun::start(Arc::clone(&questionnaire));
        let mut expected = 0;
        for (i, question) in questionnaire.questions().iter().enumerate() {
            // Answer even questions right, odd ones with the first wrong option.
            let answer = if i % 2 == 0 {
                question.correct_option().unwrap().to_string()
            } else {
                question
                    .options
                    .iter()
                    .find(|o| !question.is_correct(o))
                    .cloned()
                    .unwrap_or_else(|| "none".to_string())
            };
            if question.is_correct(&answer) {
                expected += 1;
            }
            quiz.submit_answer(&answer);
        }
        assert_eq!(quiz.state(), QuizState::Complete { score: expected });
        assert_eq!(quiz.total(), questionnaire.len());
    }
}
