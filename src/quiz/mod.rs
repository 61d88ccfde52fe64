pub mod session;

use std::collections::HashSet;

/// A generated quiz as served by the quiz service, either freshly generated
/// or replayed from history. Never mutated once received.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_entities: KeyEntities,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(rename = "quiz")]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub related_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KeyEntities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "answer")]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub difficulty: String,
}

impl Question {
    pub fn is_correct(&self, option: &str) -> bool {
        self.correct_answer == option
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QuizError {
    #[error("quiz has no questions")]
    NoQuestions,
    #[error("question {index} has {count} option(s), at least 2 are required")]
    TooFewOptions { index: usize, count: usize },
    #[error("question {index} lists option '{option}' more than once")]
    DuplicateOption { index: usize, option: String },
    #[error("question {index}: answer '{answer}' is not one of its options")]
    AnswerNotAnOption { index: usize, answer: String },
}

impl QuizDocument {
    /// Checks the shape every session relies on: at least one question, and
    /// per question at least two unique options, one of which is the answer.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.options.len() < 2 {
                return Err(QuizError::TooFewOptions {
                    index,
                    count: question.options.len(),
                });
            }

            let mut seen = HashSet::new();
            if let Some(duplicate) = question.options.iter().find(|o| !seen.insert(o.as_str())) {
                return Err(QuizError::DuplicateOption {
                    index,
                    option: duplicate.clone(),
                });
            }

            if !question.options.contains(&question.correct_answer) {
                return Err(QuizError::AnswerNotAnOption {
                    index,
                    answer: question.correct_answer.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

/// One row of the service's history listing.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date_generated: Option<String>,
}

impl HistoryEntry {
    /// Button label, also parsed back by [`HistoryEntry::id_from_label`].
    pub fn label(&self) -> String {
        format!(
            "#{} {}",
            self.id,
            self.title.as_deref().unwrap_or("Untitled quiz")
        )
    }

    pub fn id_from_label(label: &str) -> Option<i64> {
        label
            .trim()
            .strip_prefix('#')?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }
}

#[cfg(test)]
pub(crate) fn sample_quiz() -> QuizDocument {
    let question = |text: &str, options: [&str; 2], answer: &str| Question {
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct_answer: answer.to_string(),
        ..Default::default()
    };

    QuizDocument {
        title: "Europe".to_string(),
        summary: "Capitals and arithmetic.".to_string(),
        questions: vec![
            question("Capital of France?", ["Paris", "Berlin"], "Paris"),
            question("2 + 2?", ["4", "5"], "4"),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_wire_shape() {
        let body = serde_json::json!({
            "id": 7,
            "url": "https://en.wikipedia.org/wiki/Alan_Turing",
            "title": "Alan Turing",
            "summary": "Mathematician.",
            "key_entities": {
                "people": ["Alan Turing"],
                "organizations": ["Bletchley Park"],
                "locations": ["London"]
            },
            "sections": ["Early life"],
            "quiz": [{
                "question": "Where did Turing work during the war?",
                "options": ["Bletchley Park", "CERN"],
                "answer": "Bletchley Park",
                "explanation": "He worked on Enigma there.",
                "difficulty": "easy"
            }],
            "related_topics": ["Enigma"]
        });

        let quiz: QuizDocument = serde_json::from_value(body).unwrap();

        assert_eq!(quiz.id, Some(7));
        assert_eq!(quiz.key_entities.organizations, vec!["Bletchley Park"]);
        assert_eq!(quiz.questions[0].correct_answer, "Bletchley Park");
        assert_eq!(quiz.questions[0].difficulty, "easy");
        assert_eq!(quiz.related_topics, vec!["Enigma"]);
        assert_eq!(quiz.validate(), Ok(()));
    }

    #[test]
    fn rejects_answer_outside_options() {
        let mut quiz = sample_quiz();
        quiz.questions[1].correct_answer = "four".to_string();

        assert_eq!(
            quiz.validate(),
            Err(QuizError::AnswerNotAnOption {
                index: 1,
                answer: "four".to_string()
            })
        );
    }

    #[test]
    fn rejects_duplicate_and_missing_options() {
        let mut quiz = sample_quiz();
        quiz.questions[0].options = vec!["Paris".to_string(), "Paris".to_string()];
        assert!(matches!(
            quiz.validate(),
            Err(QuizError::DuplicateOption { index: 0, .. })
        ));

        quiz.questions[0].options = vec!["Paris".to_string()];
        assert_eq!(
            quiz.validate(),
            Err(QuizError::TooFewOptions { index: 0, count: 1 })
        );

        assert_eq!(QuizDocument::default().validate(), Err(QuizError::NoQuestions));
    }

    #[test]
    fn history_label_round_trips_id() {
        let entry = HistoryEntry {
            id: 42,
            url: None,
            title: Some("Alan Turing".to_string()),
            date_generated: None,
        };

        assert_eq!(entry.label(), "#42 Alan Turing");
        assert_eq!(HistoryEntry::id_from_label(&entry.label()), Some(42));
        assert_eq!(HistoryEntry::id_from_label("Alan Turing"), None);
    }
}
