use std::collections::BTreeMap;

use log::debug;

use crate::quiz::QuizDocument;

/// Answer-count progression of a session. Reveal and score are tracked
/// separately and can be layered on top of any of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Unanswered,
    Answering,
    FullyAnswered,
}

/// What a single option means for the user right now. Always derived from the
/// current session, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionMark {
    pub picked: bool,
    pub correct: bool,
    pub wrong_pick: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("question {index} does not exist, the quiz has {count} question(s)")]
    NoSuchQuestion { index: usize, count: usize },
    #[error("answers are revealed, reset the quiz to answer again")]
    AnswersRevealed,
}

/// In-memory state of one quiz being taken.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    quiz: QuizDocument,
    selections: BTreeMap<usize, String>,
    answers_revealed: bool,
    score: Option<usize>,
}

impl QuizSession {
    pub fn new(quiz: QuizDocument) -> Self {
        Self {
            quiz,
            selections: BTreeMap::new(),
            answers_revealed: false,
            score: None,
        }
    }

    pub fn quiz(&self) -> &QuizDocument {
        &self.quiz
    }

    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    /// Records `option` as the pick for `index`, replacing any earlier pick.
    ///
    /// The option text is not checked against the question's options; an
    /// unknown value is kept and simply never matches the answer. Once answers
    /// are revealed, picks are refused until [`QuizSession::reset`].
    pub fn select_answer(
        &mut self,
        index: usize,
        option: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.check_index(index)?;
        if self.answers_revealed {
            return Err(SessionError::AnswersRevealed);
        }

        let option = option.into();
        if self.selections.get(&index) != Some(&option) {
            // A score only describes the selections it was computed from.
            self.score = None;
        }
        debug!("question {} answered with {:?}", index, option);
        self.selections.insert(index, option);
        Ok(())
    }

    pub fn reveal_answers(&mut self) {
        self.answers_revealed = true;
    }

    pub fn answers_revealed(&self) -> bool {
        self.answers_revealed
    }

    pub fn answered_count(&self) -> usize {
        self.selections.len()
    }

    /// Whether scoring is on offer: every question has a pick.
    pub fn can_score(&self) -> bool {
        self.selections.len() == self.question_count()
    }

    /// Counts exact, case-sensitive matches between picks and answers.
    /// Returns `None` without touching the state while any question is open.
    pub fn compute_score(&mut self) -> Option<usize> {
        if !self.can_score() {
            return None;
        }

        let score = self
            .quiz
            .questions
            .iter()
            .enumerate()
            .filter(|(i, q)| self.selections.get(i).is_some_and(|pick| q.is_correct(pick)))
            .count();
        self.score = Some(score);
        Some(score)
    }

    pub fn score(&self) -> Option<usize> {
        self.score
    }

    /// Score as a whole percent of the question count, rounded half up.
    pub fn percentage(&self) -> Option<u32> {
        let total = self.question_count();
        match self.score {
            Some(score) if total > 0 => Some(((score * 200 + total) / (2 * total)) as u32),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.selections.clear();
        self.score = None;
        self.answers_revealed = false;
    }

    pub fn selection(&self, index: usize) -> Option<&str> {
        self.selections.get(&index).map(String::as_str)
    }

    pub fn progress(&self) -> Progress {
        match self.selections.len() {
            0 => Progress::Unanswered,
            n if n >= self.question_count() => Progress::FullyAnswered,
            _ => Progress::Answering,
        }
    }

    pub fn option_mark(&self, index: usize, option: &str) -> OptionMark {
        let picked = self.selection(index) == Some(option);
        let correct = self.answers_revealed
            && self
                .quiz
                .questions
                .get(index)
                .is_some_and(|q| q.is_correct(option));
        OptionMark {
            picked,
            correct,
            wrong_pick: self.answers_revealed && picked && !correct,
        }
    }

    /// First question without a pick, searching forward from `from` and
    /// wrapping around.
    pub fn next_unanswered(&self, from: usize) -> Option<usize> {
        let count = self.question_count();
        (0..count)
            .map(|offset| (from + offset) % count)
            .find(|i| !self.selections.contains_key(i))
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.question_count() {
            Ok(())
        } else {
            Err(SessionError::NoSuchQuestion {
                index,
                count: self.question_count(),
            })
        }
    }
}
