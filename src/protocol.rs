//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and consumers independently.

use serde::{Deserialize, Serialize};

use crate::domain::{GenerationRun, PersistedQuestion};

/// Body of the generation trigger.
#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    #[serde(rename = "lessonText")]
    pub lesson_text: String,
    #[serde(rename = "totalQuestions")]
    pub total_questions: Option<usize>,
}

/// Immediate reply to a trigger: the run continues in the background.
#[derive(Serialize)]
pub struct GenerateAccepted {
    #[serde(rename = "lessonId")]
    pub lesson_id: i64,
    pub status: String,
}

/// Run-state DTO returned by the status endpoint.
#[derive(Serialize)]
pub struct RunStatusOut {
    #[serde(rename = "lessonId")]
    pub lesson_id: i64,
    pub status: String,
    pub progress: u8,
    #[serde(rename = "questionCount")]
    pub question_count: usize,
    pub summary: Option<String>,
}

/// Convert the internal run record to the public DTO.
pub fn to_status_out(run: &GenerationRun) -> RunStatusOut {
    RunStatusOut {
        lesson_id: run.lesson_id,
        status: run.status.as_str().to_string(),
        progress: run.progress,
        question_count: run.produced_count,
        summary: run.summary.clone(),
    }
}

/// Flattened question DTO for downstream assessment tooling.
#[derive(Serialize)]
pub struct QuestionOut {
    pub id: String,
    #[serde(rename = "questionText")]
    pub question_text: String,
    #[serde(rename = "answerText")]
    pub answer_text: String,
    pub difficulty: String,
    #[serde(rename = "maxScore")]
    pub max_score: u32,
    #[serde(rename = "optionA")]
    pub option_a: Option<String>,
    #[serde(rename = "optionB")]
    pub option_b: Option<String>,
    #[serde(rename = "optionC")]
    pub option_c: Option<String>,
    #[serde(rename = "optionD")]
    pub option_d: Option<String>,
    #[serde(rename = "correctOption")]
    pub correct_option: Option<String>,
    #[serde(rename = "workedSolution")]
    pub worked_solution: Option<String>,
}

/// Convert a persisted row to the public DTO.
pub fn to_question_out(q: &PersistedQuestion) -> QuestionOut {
    QuestionOut {
        id: q.id.clone(),
        question_text: q.question_text.clone(),
        answer_text: q.answer_text.clone(),
        difficulty: q.difficulty.as_str().to_string(),
        max_score: q.max_score,
        option_a: q.option_a.clone(),
        option_b: q.option_b.clone(),
        option_c: q.option_c.clone(),
        option_d: q.option_d.clone(),
        correct_option: q.correct_option.map(|o| o.as_str().to_string()),
        worked_solution: q.worked_solution.clone(),
    }
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
