use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// One question-answer turn, with the per-answer AI feedback attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub feedback: Value,
}

#[derive(Debug, Error)]
#[error("interview session is already complete")]
pub struct SessionComplete;

/// A mock interview session.
///
/// State machine: in progress while `current_question_index` is below
/// the question count; complete once it reaches it, at which point
/// `completed_at` is set and a terminal evaluation is computed exactly
/// once. The index only ever advances.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewSessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub interview_type: String,
    pub difficulty: String,
    pub questions: Json<Vec<String>>,
    pub current_question_index: i32,
    pub exchanges: Json<Vec<Exchange>>,
    pub evaluation: Option<Value>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InterviewSessionRow {
    pub fn is_complete(&self) -> bool {
        self.current_question_index as usize >= self.questions.len()
    }

    /// The question awaiting an answer, if any.
    pub fn current_question(&self) -> Option<&str> {
        self.questions
            .get(self.current_question_index as usize)
            .map(String::as_str)
    }

    /// Appends exactly one exchange and advances the index by one.
    /// Sets `completed_at` when the last question is answered.
    pub fn record_exchange(
        &mut self,
        exchange: Exchange,
        now: DateTime<Utc>,
    ) -> Result<(), SessionComplete> {
        if self.is_complete() {
            return Err(SessionComplete);
        }
        self.exchanges.push(exchange);
        self.current_question_index += 1;
        if self.is_complete() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(questions: Vec<&str>) -> InterviewSessionRow {
        InterviewSessionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: "Backend Engineer".to_string(),
            interview_type: "technical".to_string(),
            difficulty: "medium".to_string(),
            questions: Json(questions.into_iter().map(String::from).collect()),
            current_question_index: 0,
            exchanges: Json(Vec::new()),
            evaluation: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn exchange(answer: &str) -> Exchange {
        Exchange {
            question: "q".to_string(),
            answer: answer.to_string(),
            feedback: json!({"score": 7}),
        }
    }

    #[test]
    fn test_fresh_session_starts_at_index_zero() {
        let s = session(vec!["q1", "q2"]);
        assert_eq!(s.current_question_index, 0);
        assert_eq!(s.current_question(), Some("q1"));
        assert!(!s.is_complete());
    }

    #[test]
    fn test_each_exchange_advances_index_by_exactly_one() {
        let mut s = session(vec!["q1", "q2", "q3"]);
        let now = Utc::now();

        s.record_exchange(exchange("a1"), now).unwrap();
        assert_eq!(s.current_question_index, 1);
        assert_eq!(s.exchanges.len(), 1);
        assert_eq!(s.current_question(), Some("q2"));

        s.record_exchange(exchange("a2"), now).unwrap();
        assert_eq!(s.current_question_index, 2);
        assert_eq!(s.exchanges.len(), 2);
        assert!(!s.is_complete());
    }

    #[test]
    fn test_answering_last_question_completes_session() {
        let mut s = session(vec!["q1"]);
        let now = Utc::now();

        s.record_exchange(exchange("a1"), now).unwrap();

        assert!(s.is_complete());
        assert_eq!(s.completed_at, Some(now));
        assert_eq!(s.current_question(), None);
    }

    #[test]
    fn test_recording_on_complete_session_is_rejected() {
        let mut s = session(vec!["q1"]);
        let now = Utc::now();
        s.record_exchange(exchange("a1"), now).unwrap();

        assert!(s.record_exchange(exchange("a2"), now).is_err());
        assert_eq!(s.current_question_index, 1);
        assert_eq!(s.exchanges.len(), 1);
    }
}
