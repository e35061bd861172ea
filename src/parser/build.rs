use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::dataset::{Choice, QuestionRecord, QuestionType, EXPLANATION_PLACEHOLDER};
use crate::error::{self, Result};
use crate::parser::choices::ExtractedQuestion;

/// Source of `answerId` at build time. The extracted text carries no answer
/// key, so anything other than a ground-truth key must return `None`.
pub trait AnswerPolicy {
    fn answer_for(&self, record_id: u32, choices: &[Choice]) -> Option<u32>;
}

/// No answer known. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unverified;

impl AnswerPolicy for Unverified {
    fn answer_for(&self, _record_id: u32, _choices: &[Choice]) -> Option<u32> {
        None
    }
}

/// Ground-truth answers keyed by record id, as ingested from an answer-key file
/// (`{"12": 2, "13": 1}`).
#[derive(Debug, Clone, Default)]
pub struct AnswerKey {
    answers: HashMap<u32, u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestCounts {
    pub applied: usize,
    pub rejected: usize,
    pub missing: usize,
}

impl AnswerKey {
    #[cfg(test)]
    pub fn new(answers: HashMap<u32, u32>) -> Self {
        AnswerKey { answers }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw: HashMap<String, u32> = error::read_json(path)?;
        let mut answers = HashMap::with_capacity(raw.len());
        for (k, v) in raw {
            match k.trim().parse::<u32>() {
                Ok(id) => {
                    answers.insert(id, v);
                }
                Err(_) => warn!(key = %k, "answer key entry is not a record id, skipped"),
            }
        }
        Ok(AnswerKey { answers })
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Overwrite `answerId` on every record the key covers. Answers that point
    /// outside the choice list or at a placeholder are refused.
    pub fn apply(&self, records: &mut [QuestionRecord]) -> IngestCounts {
        let mut counts = IngestCounts::default();
        for record in records.iter_mut() {
            if !self.answers.contains_key(&record.id) {
                counts.missing += 1;
                continue;
            }
            match self.answer_for(record.id, &record.choices) {
                Some(answer) => {
                    record.answer_id = Some(answer);
                    counts.applied += 1;
                }
                None => counts.rejected += 1,
            }
        }
        counts
    }
}

impl AnswerPolicy for AnswerKey {
    fn answer_for(&self, record_id: u32, choices: &[Choice]) -> Option<u32> {
        let answer = *self.answers.get(&record_id)?;
        match choices.iter().find(|c| c.id == answer) {
            Some(c) if !c.is_placeholder() => Some(answer),
            Some(_) => {
                warn!(record_id, answer, "answer points at a placeholder choice, refused");
                None
            }
            None => {
                warn!(record_id, answer, "answer outside choice range, refused");
                None
            }
        }
    }
}

/// Assemble a record. Choices are numbered in order and padded with
/// placeholders up to `target_choices`.
pub fn build(
    question: ExtractedQuestion,
    kind: QuestionType,
    id: u32,
    target_choices: usize,
    policy: &dyn AnswerPolicy,
) -> QuestionRecord {
    let mut choices: Vec<Choice> = question
        .choices
        .into_iter()
        .take(target_choices)
        .zip(1u32..)
        .map(|(text, cid)| Choice::new(cid, text))
        .collect();
    pad_choices(&mut choices, target_choices);

    let answer_id = policy.answer_for(id, &choices);
    QuestionRecord {
        id,
        kind,
        statement: question.statement,
        choices,
        answer_id,
        explanation: EXPLANATION_PLACEHOLDER.to_string(),
        rank: None,
        importance_weight: None,
        status: None,
        status_reason: None,
    }
}

/// Append placeholders until `target` choices exist. Returns how many were added.
pub fn pad_choices(choices: &mut Vec<Choice>, target: usize) -> usize {
    let mut added = 0;
    while choices.len() < target {
        choices.push(Choice::placeholder(choices.len() as u32 + 1));
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::choices::{extract, Limits};

    fn two_choice() -> ExtractedQuestion {
        extract("Which is correct? 1）Apples 2）Oranges", &Limits::default()).unwrap()
    }

    #[test]
    fn pads_to_three_with_one_placeholder() {
        let r = build(two_choice(), QuestionType::Written, 1, 3, &Unverified);
        assert_eq!(r.choices.len(), 3);
        assert_eq!(r.choices.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(r.choices.iter().filter(|c| c.is_placeholder()).count(), 1);
        assert!(r.choices[2].placeholder);
        assert_eq!(r.choices[0].text, "Apples");
        assert_eq!(r.answer_id, None);
    }

    #[test]
    fn answer_key_applies_only_genuine_choices() {
        let key = AnswerKey::new(HashMap::from([(1, 2), (2, 3), (3, 9)]));
        let mut records = vec![
            build(two_choice(), QuestionType::Written, 1, 3, &Unverified),
            build(two_choice(), QuestionType::Written, 2, 3, &Unverified),
            build(two_choice(), QuestionType::Written, 3, 3, &Unverified),
            build(two_choice(), QuestionType::Written, 4, 3, &Unverified),
        ];
        let counts = key.apply(&mut records);
        assert_eq!(
            counts,
            IngestCounts {
                applied: 1,
                rejected: 2,
                missing: 1
            }
        );
        assert_eq!(records[0].answer_id, Some(2));
        assert_eq!(records[1].answer_id, None);
    }

    #[test]
    fn answer_key_as_build_policy() {
        let key = AnswerKey::new(HashMap::from([(5, 1)]));
        let r = build(two_choice(), QuestionType::Practical, 5, 3, &key);
        assert_eq!(r.answer_id, Some(1));
    }

    #[test]
    fn loads_string_keyed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, r#"{"1": 2, "x": 1, " 3 ": 1}"#).unwrap();
        let key = AnswerKey::load(&path).unwrap();
        assert_eq!(key.len(), 2);
    }
}
