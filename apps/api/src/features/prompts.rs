// All LLM prompt constants for the feature handlers. Templates carry
// `{{placeholder}}` tokens rendered via `ai::template::render`.

// ────────────────────────────────────────────────────────────────────────────
// Resume analysis
// ────────────────────────────────────────────────────────────────────────────

pub const RESUME_SYSTEM: &str = "You are an expert career coach and resume reviewer \
    for university students and early-career candidates. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

pub const RESUME_PROMPT: &str = r#"Analyze the following resume for a candidate targeting the role of "{{target_role}}".

Return a JSON object with this EXACT schema (no extra fields):
{
  "score": 72,
  "strengths": ["Quantified achievements in internship section"],
  "weaknesses": ["Skills section lists tools without context"],
  "suggestions": ["Move education above projects for a student resume"],
  "summary": "One-paragraph overall assessment"
}

Rules:
- "score" is an integer from 0 to 100 measuring fit and quality.
- Each list contains 3 to 6 short, concrete items.
- Base every item on the resume text; do not invent experience.

RESUME:
{{resume_text}}"#;

// ────────────────────────────────────────────────────────────────────────────
// Skill roadmap
// ────────────────────────────────────────────────────────────────────────────

pub const SKILLS_SYSTEM: &str = "You are a career-planning expert who designs \
    practical, week-by-week learning roadmaps for students. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

pub const SKILLS_PROMPT: &str = r#"Design a learning roadmap that takes a student from their current skills to being job-ready for the role of "{{goal_role}}".

Current skills: {{current_skills}}

Return a JSON object with this EXACT schema (no extra fields):
{
  "phases": [
    {
      "title": "Foundations",
      "weeks": 4,
      "skills": ["SQL basics", "HTTP fundamentals"],
      "resources": ["A specific free course or book"]
    }
  ],
  "estimated_weeks": 16
}

Rules:
- 3 to 5 phases, ordered from foundations to portfolio work.
- Skip skills the student already has; build on them instead.
- "estimated_weeks" is the sum of the phase weeks."#;

// ────────────────────────────────────────────────────────────────────────────
// Study tools
// ────────────────────────────────────────────────────────────────────────────

pub const STUDY_SYSTEM: &str = "You are a study assistant that turns course material \
    into clear, exam-ready study aids. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

pub const SUMMARIZE_PROMPT: &str = r#"Summarize the following study material.

Return a JSON object with this EXACT schema (no extra fields):
{
  "summary": "A 2-4 paragraph plain-language summary",
  "key_points": ["The most important facts, 5 to 10 items"]
}

MATERIAL:
{{material}}"#;

pub const FLASHCARDS_PROMPT: &str = r#"Create exactly {{count}} flashcards from the following study material.

Return a JSON object with this EXACT schema (no extra fields):
{
  "flashcards": [
    {"front": "Question or term", "back": "Answer or definition"}
  ]
}

Rules:
- Each card tests one fact or concept.
- Fronts are questions or terms; backs are concise answers.

MATERIAL:
{{material}}"#;

pub const QUIZ_PROMPT: &str = r#"Create a multiple-choice quiz with exactly {{count}} questions from the following study material.

Return a JSON object with this EXACT schema (no extra fields):
{
  "questions": [
    {
      "question": "What does X stand for?",
      "options": ["A", "B", "C", "D"],
      "answer_index": 2,
      "explanation": "Why this option is correct"
    }
  ]
}

Rules:
- Exactly 4 options per question, one correct.
- "answer_index" is the 0-based index of the correct option.
- Distractors must be plausible, not jokes.

MATERIAL:
{{material}}"#;

// ────────────────────────────────────────────────────────────────────────────
// Mock interview
// ────────────────────────────────────────────────────────────────────────────

pub const INTERVIEW_SYSTEM: &str = "You are an experienced interviewer running a \
    realistic mock interview for a student candidate. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

pub const INTERVIEW_QUESTIONS_PROMPT: &str = r#"Generate {{count}} interview questions for a {{difficulty}} {{interview_type}} interview for the role of "{{role}}".

Return a JSON object with this EXACT schema (no extra fields):
{
  "questions": ["First question", "Second question"]
}

Rules:
- For "behavioral" interviews, ask for specific past situations.
- For "technical" interviews, ask role-relevant technical questions answerable verbally.
- For "mixed" interviews, alternate the two.
- Order questions from warm-up to hardest."#;

pub const INTERVIEW_FEEDBACK_PROMPT: &str = r#"You asked the candidate this interview question:
"{{question}}"

Their answer:
"{{answer}}"

Evaluate the answer using the STAR method (Situation, Task, Action, Result) where applicable.

Return a JSON object with this EXACT schema (no extra fields):
{
  "score": 7,
  "feedback": "2-3 sentences of specific, actionable feedback",
  "star_coverage": ["situation", "action"]
}

Rules:
- "score" is an integer from 0 to 10.
- "star_coverage" lists which STAR elements the answer demonstrated.
- Judge only what was said; do not assume unstated context."#;

pub const INTERVIEW_EVALUATION_PROMPT: &str = r#"The mock interview for the role of "{{role}}" ({{difficulty}} {{interview_type}}) is complete. Here is the full transcript of questions, answers, and per-answer feedback:

{{transcript}}

Write the terminal evaluation.

Return a JSON object with this EXACT schema (no extra fields):
{
  "overall_score": 68,
  "strengths": ["Specific things the candidate did well"],
  "areas_to_improve": ["Specific, prioritized improvement areas"],
  "summary": "One-paragraph overall verdict with a recommendation"
}

Rules:
- "overall_score" is an integer from 0 to 100.
- Weigh later answers no more heavily than earlier ones.
- Reference concrete moments from the transcript."#;

// ────────────────────────────────────────────────────────────────────────────
// Tutoring chat
// ────────────────────────────────────────────────────────────────────────────

/// The one plain-text call path: replies are prose, not JSON.
pub const TUTOR_SYSTEM: &str = "You are a patient, encouraging tutor for university \
    students. Explain concepts step by step, check understanding, and \
    prefer guiding questions over giving away full solutions. Keep \
    answers under 300 words unless the student asks for more depth.";

pub const TUTOR_PROMPT: &str = r#"Conversation so far:
{{conversation}}

Student: {{message}}

Reply as the tutor."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_system_prompts_forbid_non_json_output() {
        // Chat is the deliberate exception: its replies are prose.
        for system in [RESUME_SYSTEM, SKILLS_SYSTEM, STUDY_SYSTEM, INTERVIEW_SYSTEM] {
            assert!(system.contains("valid JSON only"), "missing JSON clause");
        }
        assert!(!TUTOR_SYSTEM.contains("JSON"));
    }

    #[test]
    fn test_templates_carry_expected_placeholders() {
        assert!(RESUME_PROMPT.contains("{{resume_text}}"));
        assert!(RESUME_PROMPT.contains("{{target_role}}"));
        assert!(SKILLS_PROMPT.contains("{{current_skills}}"));
        assert!(QUIZ_PROMPT.contains("{{count}}"));
        assert!(INTERVIEW_EVALUATION_PROMPT.contains("{{transcript}}"));
        assert!(TUTOR_PROMPT.contains("{{conversation}}"));
    }
}
