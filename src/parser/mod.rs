pub mod build;
pub mod choices;
pub mod normalize;
pub mod segments;

use tracing::debug;

use crate::dataset::{self, QuestionRecord};
use build::AnswerPolicy;
use choices::{Limits, Rejection};
use segments::Style;

/// A span that yielded no record.
#[derive(Debug, Clone)]
pub struct DroppedSpan {
    pub style: Style,
    pub ordinal: u32,
    pub reason: Rejection,
    pub preview: String,
}

#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub records: Vec<QuestionRecord>,
    pub dropped: Vec<DroppedSpan>,
}

/// Three-pass pipeline: raw text → spans → (statement, choices) → records.
/// Practical spans are numbered before written ones; ids continue from
/// `next_id`, which is left pointing at the next free id.
pub fn process_text(
    raw: &str,
    next_id: &mut u32,
    limits: &Limits,
    policy: &dyn AnswerPolicy,
) -> ExtractOutcome {
    let mut outcome = ExtractOutcome::default();

    for style in Style::ALL {
        for span in segments::segment(raw, style) {
            match choices::extract(span.text, limits) {
                Ok(question) => {
                    let record = build::build(
                        question,
                        style.question_type(),
                        *next_id,
                        limits.target_choices,
                        policy,
                    );
                    *next_id += 1;
                    outcome.records.push(record);
                }
                Err(reason) => {
                    debug!(?style, ordinal = span.ordinal, offset = span.offset, %reason, "span dropped");
                    outcome.dropped.push(DroppedSpan {
                        style,
                        ordinal: span.ordinal,
                        reason,
                        preview: dataset::preview(span.text, 40),
                    });
                }
            }
        }
    }

    outcome
}
