//! The AI-call orchestration layer: prompt templating, JSON recovery,
//! input hashing, and the retrying orchestrator itself.

pub mod extract;
pub mod hash;
pub mod orchestrator;
pub mod template;
