use std::fmt;
use std::sync::LazyLock;

use itertools::Itertools;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::audit::choice_key;
use crate::audit::rules::{Check, RuleSet, Severity};
use crate::dataset::QuestionRecord;
use crate::parser::choices::has_inline_marker;
use crate::parser::normalize::has_markup;

// Leftover numbering at the head of a choice: `1）`, `(2)`, `③`.
static CHOICE_NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[0-9０-９]{1,2}[）)]|[(（][0-9０-９]{1,2}[)）]|[①-⑳])").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Risk {
    Accurate,
    Minor,
    NeedsReview,
    NeedsFix,
}

impl Risk {
    pub const ALL: [Risk; 4] = [Risk::NeedsFix, Risk::NeedsReview, Risk::Minor, Risk::Accurate];

    fn from_worst(worst: Option<Severity>) -> Risk {
        match worst {
            None => Risk::Accurate,
            Some(Severity::Low) => Risk::Minor,
            Some(Severity::Medium) => Risk::NeedsReview,
            Some(Severity::High) => Risk::NeedsFix,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Risk::Accurate => "accurate",
            Risk::Minor => "minor",
            Risk::NeedsReview => "needs-review",
            Risk::NeedsFix => "needs-fix",
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub check: Check,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub id: u32,
    pub risk: Risk,
    pub findings: Vec<Finding>,
}

impl Assessment {
    pub fn issues(&self) -> Vec<String> {
        self.findings.iter().map(|f| f.message.clone()).collect()
    }

    /// High-severity content finding, the kind a text fix can address.
    pub fn needs_factual_fix(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.check.is_factual() && f.severity == Severity::High)
    }
}

/// Run every rule against one record. Pure: same record and rules, same result.
pub fn assess(record: &QuestionRecord, rules: &RuleSet, target_choices: usize) -> Assessment {
    let mut findings = Vec::new();
    let statement_lower = record.statement.to_lowercase();

    for rule in &rules.rules {
        let mut found = |message: String| {
            findings.push(Finding {
                check: rule.check,
                severity: rule.severity,
                message,
            })
        };
        match rule.check {
            Check::Pattern => {
                for (location, text) in located_texts(record) {
                    if rule.pattern.as_ref().is_some_and(|re| re.is_match(text)) {
                        found(format!("{}: {}", location, rule.message));
                    }
                }
            }
            Check::Statement => {
                if rule.statement_matches(&statement_lower) {
                    found(rule.message.clone());
                }
            }
            Check::ChoiceCount => {
                if record.choices.len() != target_choices {
                    found(format!(
                        "{}: {}個（{}個であるべき）",
                        rule.message,
                        record.choices.len(),
                        target_choices
                    ));
                }
            }
            Check::DuplicateChoices => {
                let duplicates = record
                    .choices
                    .iter()
                    .filter(|c| !c.is_placeholder())
                    .map(|c| choice_key(&c.text))
                    .duplicates();
                for text in duplicates {
                    found(format!("{}: 「{}」", rule.message, text));
                }
            }
            Check::Markup => {
                for (location, text) in located_texts(record) {
                    if has_markup(text) {
                        found(format!("{}: {}", location, rule.message));
                    }
                }
            }
            Check::StatementNumbering => {
                if has_inline_marker(&record.statement) {
                    found(rule.message.clone());
                }
            }
            Check::ChoiceNumbering => {
                for c in record.choices.iter().filter(|c| !c.is_placeholder()) {
                    if CHOICE_NUMBERING_RE.is_match(&c.text) {
                        found(format!("選択肢{}: {}", c.id, rule.message));
                    }
                }
            }
        }
    }

    let worst = findings.iter().map(|f| f.severity).max();
    Assessment {
        id: record.id,
        risk: Risk::from_worst(worst),
        findings,
    }
}

fn located_texts(record: &QuestionRecord) -> Vec<(String, &str)> {
    let mut out = vec![("問題文".to_string(), record.statement.as_str())];
    for c in record.choices.iter().filter(|c| !c.is_placeholder()) {
        out.push((format!("選択肢{}", c.id), c.text.as_str()));
    }
    out
}

/// Assess every record in parallel; output order follows input order.
pub fn validate_all(
    records: &[QuestionRecord],
    rules: &RuleSet,
    target_choices: usize,
) -> Vec<Assessment> {
    records
        .par_iter()
        .map(|r| assess(r, rules, target_choices))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{self, Choice, QuestionType, EXPLANATION_PLACEHOLDER};

    fn rules() -> RuleSet {
        RuleSet::load_or_builtin(None).unwrap()
    }

    fn record(statement: &str, choices: &[&str]) -> QuestionRecord {
        QuestionRecord {
            id: 1,
            kind: QuestionType::Written,
            statement: statement.to_string(),
            choices: choices
                .iter()
                .zip(1u32..)
                .map(|(t, id)| Choice::new(id, *t))
                .collect(),
            answer_id: None,
            explanation: EXPLANATION_PLACEHOLDER.to_string(),
            rank: None,
            importance_weight: None,
            status: None,
            status_reason: None,
        }
    }

    #[test]
    fn outdated_pension_amount_needs_fix() {
        let r = record(
            "老齢基礎年金の満額は年額816,000円である。",
            &["適切", "不適切", "判断できない"],
        );
        let a = assess(&r, &rules(), 3);
        assert_eq!(a.risk, Risk::NeedsFix);
        assert!(a.needs_factual_fix());
        assert!(a.issues().iter().any(|i| i.contains("816,000円")));
        assert!(a.issues().iter().any(|i| i.starts_with("問題文: ")));
    }

    #[test]
    fn excluded_term_suppresses_conditional_rule() {
        let r = record(
            "2024年度価額の老齢基礎年金の満額は816,000円である。",
            &["適切", "不適切", "判断できない"],
        );
        let a = assess(&r, &rules(), 3);
        // only the medium amount pattern remains
        assert_eq!(a.risk, Risk::NeedsReview);
        assert!(!a.needs_factual_fix());
    }

    #[test]
    fn duplicate_choices_flagged() {
        let r = record(
            "贈与税の基礎控除額として正しいものはどれか。",
            &["1,000,000円", "1,000,000円", "1,100,000円"],
        );
        let a = assess(&r, &rules(), 3);
        assert_eq!(a.risk, Risk::NeedsFix);
        assert!(!a.needs_factual_fix());
        assert_eq!(
            a.findings
                .iter()
                .filter(|f| f.check == Check::DuplicateChoices)
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>(),
            vec!["選択肢の重複: 「1,000,000円」"]
        );
    }

    #[test]
    fn structural_checks() {
        let mut r = record("次のうち正しいものはどれか。1）甲 2）乙", &["<b>丙</b>", "③ 丁"]);
        let a = assess(&r, &rules(), 3);
        let checks: Vec<_> = a.findings.iter().map(|f| f.check).collect();
        assert!(checks.contains(&Check::ChoiceCount));
        assert!(checks.contains(&Check::StatementNumbering));
        assert!(checks.contains(&Check::Markup));
        assert!(checks.contains(&Check::ChoiceNumbering));

        r.choices.push(Choice::placeholder(3));
        let a = assess(&r, &rules(), 3);
        assert!(!a.findings.iter().any(|f| f.check == Check::ChoiceCount));
    }

    #[test]
    fn clean_record_is_accurate() {
        let r = record(
            "相続税の基礎控除額の計算式として正しいものはどれか。",
            &["3,000万円＋600万円×法定相続人の数", "5,000万円＋1,000万円×法定相続人の数", "3,000万円"],
        );
        let a = assess(&r, &rules(), 3);
        assert_eq!(a.risk, Risk::Accurate);
        assert!(a.findings.is_empty());
    }

    #[test]
    fn low_severity_is_minor() {
        let r = record(
            "小規模企業共済の掛金は税額控除の対象となる。",
            &["適切", "不適切", "判断できない"],
        );
        assert_eq!(assess(&r, &rules(), 3).risk, Risk::Minor);
    }

    #[test]
    fn validation_is_deterministic() {
        let records = dataset::load(std::path::Path::new("tests/fixtures/defective_questions.json")).unwrap();
        let first = validate_all(&records, &rules(), 3);
        let second = validate_all(&records, &rules(), 3);
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|a| a.id).collect::<Vec<_>>(), records.iter().map(|r| r.id).collect::<Vec<_>>());
    }

    #[test]
    fn risk_labels() {
        assert_eq!(serde_json::to_value(Risk::NeedsFix).unwrap(), "needs-fix");
        assert_eq!(Risk::NeedsReview.to_string(), "needs-review");
    }
}
