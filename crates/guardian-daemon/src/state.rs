//! Session phase machine.

/// Phase of the coordinator's control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No countdown or quiz; the surface sits in the background.
    #[default]
    Idle,
    /// A countdown is ticking.
    CountdownRunning,
    /// The countdown ran out; the quiz is about to be shown.
    CountdownExpired,
    /// The quiz is on screen, waiting for answers.
    QuizActive,
}

impl SessionPhase {
    /// Whether the user may close the surface right now.
    pub fn can_close(self) -> bool {
        self == Self::Idle
    }

    /// Whether the user may minimize the surface right now.
    pub fn can_minimize(self) -> bool {
        matches!(self, Self::CountdownExpired | Self::QuizActive)
    }

    /// Whether a countdown or quiz is in progress.
    pub fn is_active(self) -> bool {
        self != Self::Idle
    }

    /// Whether the quiz owns the surface.
    pub fn in_quiz(self) -> bool {
        matches!(self, Self::CountdownExpired | Self::QuizActive)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::CountdownRunning => write!(f, "CountdownRunning"),
            Self::CountdownExpired => write!(f, "CountdownExpired"),
            Self::QuizActive => write!(f, "QuizActive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_can_close() {
        assert!(SessionPhase::Idle.can_close());
        assert!(!SessionPhase::CountdownRunning.can_close());
        assert!(!SessionPhase::CountdownExpired.can_close());
        assert!(!SessionPhase::QuizActive.can_close());
    }

    #[test]
    fn minimize_only_during_quiz() {
        assert!(!SessionPhase::Idle.can_minimize());
        assert!(!SessionPhase::CountdownRunning.can_minimize());
        assert!(SessionPhase::CountdownExpired.can_minimize());
        assert!(SessionPhase::QuizActive.can_minimize());
        assert!(SessionPhase::CountdownExpired.in_quiz());
        assert!(!SessionPhase::CountdownRunning.in_quiz());
    }

    #[test]
    fn default_is_idle() {
        assert_eq!(SessionPhase::default(), SessionPhase::Idle);
        assert!(!SessionPhase::default().is_active());
        assert_eq!(SessionPhase::QuizActive.to_string(), "QuizActive");
    }
}
