use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{self, Result};

/// Explanation text used when the source carries none.
pub const EXPLANATION_PLACEHOLDER: &str = "この問題の詳細な解説は元の過去問題集をご参照ください。";

const PLACEHOLDER_OPEN: &str = "〔補完選択肢";
const PLACEHOLDER_CLOSE: &str = "〕";

/// Reserved sentinel text for a padded choice slot. Never produced by
/// extraction since `〔` is not used by the source documents.
pub fn placeholder_text(id: u32) -> String {
    format!("{}{}{}", PLACEHOLDER_OPEN, id, PLACEHOLDER_CLOSE)
}

pub fn is_placeholder_text(text: &str) -> bool {
    text.starts_with(PLACEHOLDER_OPEN) && text.ends_with(PLACEHOLDER_CLOSE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Written,
    Practical,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestionType::Written => "written",
            QuestionType::Practical => "practical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    A,
    B,
    C,
    D,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::A, Tier::B, Tier::C, Tier::D];

    pub fn description(self) -> &'static str {
        match self {
            Tier::A => "超重要（毎回出題レベル）",
            Tier::B => "重要（頻出問題）",
            Tier::C => "標準（時々出題）",
            Tier::D => "補助（稀に出題）",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Valid,
    Fixed,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl Choice {
    pub fn new(id: u32, text: impl Into<String>) -> Self {
        Choice {
            id,
            text: text.into(),
            placeholder: false,
        }
    }

    pub fn placeholder(id: u32) -> Self {
        Choice {
            id,
            text: placeholder_text(id),
            placeholder: true,
        }
    }

    /// Placeholder either by flag or by its reserved text (hand-edited datasets
    /// sometimes lose the flag).
    pub fn is_placeholder(&self) -> bool {
        self.placeholder || is_placeholder_text(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub statement: String,
    pub choices: Vec<Choice>,
    /// `None` until a ground-truth answer key has been ingested. Never guessed.
    pub answer_id: Option<u32>,
    #[serde(default = "default_explanation")]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

fn default_explanation() -> String {
    EXPLANATION_PLACEHOLDER.to_string()
}

impl QuestionRecord {
    pub fn is_active(&self) -> bool {
        self.status != Some(Status::Invalid)
    }

    /// Statement plus every choice text, the haystack for keyword rules.
    pub fn full_text(&self) -> String {
        let mut out = self.statement.clone();
        for c in &self.choices {
            out.push(' ');
            out.push_str(&c.text);
        }
        out
    }

    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.statement, max_chars)
    }

    /// Record a fix note, keeping earlier notes. A record already marked
    /// invalid stays invalid.
    pub fn mark_fixed(&mut self, note: &str) {
        if self.status == Some(Status::Invalid) {
            return;
        }
        self.status = Some(Status::Fixed);
        match &mut self.status_reason {
            Some(existing) if existing.split(" / ").any(|n| n == note) => {}
            Some(existing) => {
                existing.push_str(" / ");
                existing.push_str(note);
            }
            None => self.status_reason = Some(note.to_string()),
        }
    }

    pub fn mark_invalid(&mut self, reason: &str) {
        self.status = Some(Status::Invalid);
        self.status_reason = Some(reason.to_string());
    }
}

/// First `max_chars` characters, with an ellipsis when cut.
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

pub fn load(path: &Path) -> Result<Vec<QuestionRecord>> {
    error::read_json(path)
}

pub fn save(path: &Path, records: &[QuestionRecord]) -> Result<()> {
    error::write_json(path, records)
}
