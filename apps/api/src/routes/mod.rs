pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::features::{chat, handle_history, interview, resume, skills, study};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume
        .route("/api/v1/resume/analyze", post(resume::handle_analyze))
        // Skills
        .route("/api/v1/skills/roadmap", post(skills::handle_roadmap))
        // Study tools
        .route("/api/v1/study/summarize", post(study::handle_summarize))
        .route("/api/v1/study/flashcards", post(study::handle_flashcards))
        .route("/api/v1/study/quiz", post(study::handle_quiz))
        // Mock interview
        .route("/api/v1/interview/start", post(interview::handle_start))
        .route(
            "/api/v1/interview/:id/answer",
            post(interview::handle_answer),
        )
        .route("/api/v1/interview/:id", get(interview::handle_get_session))
        // Tutoring chat
        .route("/api/v1/chat/message", post(chat::handle_message))
        .route(
            "/api/v1/chat/:conversation_id",
            get(chat::handle_get_conversation),
        )
        // History
        .route("/api/v1/history/:kind", get(handle_history))
        .with_state(state)
}
