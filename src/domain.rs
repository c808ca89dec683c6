//! Domain models used by the backend: difficulty levels, question kinds,
//! candidate and persisted questions, and per-lesson run state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty bucket used for quota-driven selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}
impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl Difficulty {
  /// Lenient parse for oracle-provided labels. Anything unrecognized lands in medium.
  pub fn parse_lenient(s: &str) -> Self {
    match s.trim().to_lowercase().as_str() {
      "easy" => Difficulty::Easy,
      "hard" => Difficulty::Hard,
      _ => Difficulty::Medium,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// What kind of question is this?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  /// Four options, exactly one correct (wire tag "mcq").
  MultipleChoice,
  /// Free-response with a reference answer (wire tag "theory").
  FreeResponse,
}

/// An unvalidated-turned-validated question produced by one generation pass.
/// Ephemeral: lives only between extraction and persistence.
#[derive(Clone, Debug)]
pub struct CandidateQuestion {
  pub kind: QuestionKind,
  pub question_text: String,
  /// Resolved option text for MCQ, reference answer for free-response.
  pub answer_text: String,
  pub difficulty: Difficulty,
  pub max_score: u32,
  /// Exactly 4 entries when `kind` is MultipleChoice, absent otherwise.
  pub options: Option<Vec<String>>,
  /// Index into `options` of the resolved correct answer.
  pub correct_index: Option<usize>,
  /// Step-by-step solution for calculation items; absent for conceptual ones.
  pub worked_solution: Option<String>,
  /// True when the answer cascade gave up and assigned the first option.
  pub answer_fallback: bool,
}

/// Option letter for the persisted, flattened MCQ shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectOption {
  A,
  B,
  C,
  D,
}

impl CorrectOption {
  pub fn from_index(i: usize) -> Option<Self> {
    match i {
      0 => Some(CorrectOption::A),
      1 => Some(CorrectOption::B),
      2 => Some(CorrectOption::C),
      3 => Some(CorrectOption::D),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      CorrectOption::A => "A",
      CorrectOption::B => "B",
      CorrectOption::C => "C",
      CorrectOption::D => "D",
    }
  }
}

/// Durable question row, flattened for the relational consumer.
/// Option slots and `correct_option` are null for free-response items.
#[derive(Clone, Debug, Serialize)]
pub struct PersistedQuestion {
  pub id: String,
  pub lesson_id: i64,
  pub question_text: String,
  pub answer_text: String,
  pub difficulty: Difficulty,
  pub max_score: u32,
  pub option_a: Option<String>,
  pub option_b: Option<String>,
  pub option_c: Option<String>,
  pub option_d: Option<String>,
  pub correct_option: Option<CorrectOption>,
  pub worked_solution: Option<String>,
}

impl PersistedQuestion {
  /// Flatten a validated candidate into the durable row shape. Option slots
  /// and the correct letter are only populated for MCQ items.
  pub fn from_candidate(lesson_id: i64, c: &CandidateQuestion) -> Self {
    let mut slots = [None, None, None, None];
    let mut correct_option = None;
    if c.kind == QuestionKind::MultipleChoice {
      if let Some(opts) = &c.options {
        for (slot, opt) in slots.iter_mut().zip(opts.iter()) {
          *slot = Some(opt.clone());
        }
      }
      correct_option = c.correct_index.and_then(CorrectOption::from_index);
    }
    let [option_a, option_b, option_c, option_d] = slots;
    Self {
      id: Uuid::new_v4().to_string(),
      lesson_id,
      question_text: c.question_text.clone(),
      answer_text: c.answer_text.clone(),
      difficulty: c.difficulty,
      max_score: c.max_score,
      option_a,
      option_b,
      option_c,
      option_d,
      correct_option,
      worked_solution: c.worked_solution.clone(),
    }
  }
}

/// Lifecycle of one generation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Processing,
  Done,
  Failed,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Pending => "pending",
      RunStatus::Processing => "processing",
      RunStatus::Done => "done",
      RunStatus::Failed => "failed",
    }
  }
}

/// Per-lesson run record. `progress` only ever moves forward within a run.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationRun {
  pub lesson_id: i64,
  pub status: RunStatus,
  pub progress: u8,
  pub produced_count: usize,
  pub summary: Option<String>,
}

impl GenerationRun {
  pub fn fresh(lesson_id: i64) -> Self {
    Self {
      lesson_id,
      status: RunStatus::Pending,
      progress: 0,
      produced_count: 0,
      summary: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lenient_difficulty_defaults_to_medium() {
    assert_eq!(Difficulty::parse_lenient("Easy "), Difficulty::Easy);
    assert_eq!(Difficulty::parse_lenient("HARD"), Difficulty::Hard);
    assert_eq!(Difficulty::parse_lenient("tricky"), Difficulty::Medium);
    assert_eq!(Difficulty::parse_lenient(""), Difficulty::Medium);
  }

  #[test]
  fn flatten_maps_options_and_letter() {
    let c = CandidateQuestion {
      kind: QuestionKind::MultipleChoice,
      question_text: "Which planet is largest?".into(),
      answer_text: "Jupiter".into(),
      difficulty: Difficulty::Easy,
      max_score: 1,
      options: Some(vec!["Mars".into(), "Jupiter".into(), "Venus".into(), "Saturn".into()]),
      correct_index: Some(1),
      worked_solution: None,
      answer_fallback: false,
    };
    let row = PersistedQuestion::from_candidate(7, &c);
    assert_eq!(row.lesson_id, 7);
    assert_eq!(row.option_b.as_deref(), Some("Jupiter"));
    assert_eq!(row.correct_option, Some(CorrectOption::B));
    assert!(row.worked_solution.is_none());
  }

  #[test]
  fn flatten_free_response_leaves_slots_null() {
    let c = CandidateQuestion {
      kind: QuestionKind::FreeResponse,
      question_text: "Explain photosynthesis.".into(),
      answer_text: "Light energy is converted to chemical energy.".into(),
      difficulty: Difficulty::Medium,
      max_score: 3,
      options: None,
      correct_index: None,
      worked_solution: None,
      answer_fallback: false,
    };
    let row = PersistedQuestion::from_candidate(7, &c);
    assert!(row.option_a.is_none() && row.option_d.is_none());
    assert!(row.correct_option.is_none());
  }
}
