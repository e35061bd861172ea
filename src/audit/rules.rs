use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{self, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

const HIGH_KEYWORDS: &[&str] = &["古い年金額", "旧制度", "古い情報", "更新必要"];
const MEDIUM_KEYWORDS: &[&str] = &["2024年度価額表記", "変更済み"];

impl Severity {
    /// Severity implied by how a rule message is phrased.
    pub fn from_message(message: &str) -> Severity {
        if HIGH_KEYWORDS.iter().any(|k| message.contains(k)) {
            Severity::High
        } else if MEDIUM_KEYWORDS.iter().any(|k| message.contains(k)) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Check {
    /// Regex over the statement and every choice.
    Pattern,
    /// All `requires` terms in the statement, no `excludes` term, optional regex.
    Statement,
    ChoiceCount,
    DuplicateChoices,
    Markup,
    StatementNumbering,
    ChoiceNumbering,
}

impl Check {
    /// Content-currency checks, as opposed to structural ones.
    pub fn is_factual(self) -> bool {
        matches!(self, Check::Pattern | Check::Statement)
    }
}

/// One row of a rule table as written in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    pub check: Check,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub check: Check,
    pub pattern: Option<Regex>,
    pub requires: Vec<String>,
    pub excludes: Vec<String>,
    pub message: String,
    pub severity: Severity,
}

impl Rule {
    pub fn compile(spec: RuleSpec) -> Result<Rule> {
        let pattern = match &spec.pattern {
            Some(p) => Some(Regex::new(&format!("(?i){}", p)).map_err(|source| Error::Rule {
                pattern: p.clone(),
                source,
            })?),
            None if spec.check == Check::Pattern => {
                return Err(Error::MissingPattern(spec.message));
            }
            None => None,
        };
        let severity = spec
            .severity
            .unwrap_or_else(|| Severity::from_message(&spec.message));
        Ok(Rule {
            check: spec.check,
            pattern,
            requires: spec.requires.iter().map(|s| s.to_lowercase()).collect(),
            excludes: spec.excludes.iter().map(|s| s.to_lowercase()).collect(),
            message: spec.message,
            severity,
        })
    }

    /// `Statement` rule test; `text` must already be lowercased.
    pub fn statement_matches(&self, text: &str) -> bool {
        self.requires.iter().all(|t| text.contains(t.as_str()))
            && !self.excludes.iter().any(|t| text.contains(t.as_str()))
            && self.pattern.as_ref().map_or(true, |re| re.is_match(text))
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(specs: Vec<RuleSpec>) -> Result<RuleSet> {
        if specs.is_empty() {
            return Err(Error::EmptyTable("rule"));
        }
        let rules = specs.into_iter().map(Rule::compile).collect::<Result<Vec<_>>>()?;
        Ok(RuleSet { rules })
    }

    pub fn load(path: &Path) -> Result<RuleSet> {
        RuleSet::compile(error::read_json(path)?)
    }

    /// Table from `path` if given, otherwise the built-in one.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<RuleSet> {
        match path {
            Some(p) => RuleSet::load(p),
            None => RuleSet::compile(builtin_specs()),
        }
    }
}

fn pattern(re: &str, message: &str) -> RuleSpec {
    RuleSpec {
        check: Check::Pattern,
        pattern: Some(re.to_string()),
        requires: Vec::new(),
        excludes: Vec::new(),
        message: message.to_string(),
        severity: None,
    }
}

fn statement(requires: &[&str], excludes: &[&str], message: &str) -> RuleSpec {
    RuleSpec {
        check: Check::Statement,
        pattern: None,
        requires: requires.iter().map(|s| s.to_string()).collect(),
        excludes: excludes.iter().map(|s| s.to_string()).collect(),
        message: message.to_string(),
        severity: None,
    }
}

fn structural(check: Check, message: &str, severity: Severity) -> RuleSpec {
    RuleSpec {
        check,
        pattern: None,
        requires: Vec::new(),
        excludes: Vec::new(),
        message: message.to_string(),
        severity: Some(severity),
    }
}

/// Law-currency rules as of the 2025 reference date, plus structural checks.
pub fn builtin_specs() -> Vec<RuleSpec> {
    vec![
        // pension amounts
        pattern(r"816,000円", "816,000円は2024年度価額表記、2025年度は831,700円に変更"),
        pattern(r"795,000円", "795,000円は古い年金額、2025年度は831,700円"),
        pattern(r"780,900円", "780,900円は古い年金額、2025年度は831,700円"),
        // NISA
        pattern(r"つみたてNISA.*?40万円", "旧制度、新NISAはつみたて投資枠120万円"),
        pattern(r"一般NISA.*?120万円", "旧制度、新NISAは成長投資枠240万円"),
        // mortgage deduction
        pattern(r"住宅ローン.*?1\.0%", "2025年は0.7%に変更済み"),
        pattern(r"住宅ローン.*?1%", "2025年は0.7%に変更済み"),
        // reference dates
        pattern(r"2023年.*?法令基準", "2025年法令基準に更新必要"),
        pattern(r"2022年.*?法令基準", "2025年法令基準に更新必要"),
        pattern(r"2021年.*?法令基準", "2025年法令基準に更新必要"),
        pattern(r"平成.*?法令基準", "令和7年(2025年)法令基準に更新必要"),
        statement(
            &["小規模企業共済", "30,000円", "掛金"],
            &[],
            "小規模企業共済の掛金上限は70,000円（30,000円は古い情報）",
        ),
        statement(&["小規模企業共済", "税額控除"], &[], "小規模企業共済の掛金は所得控除（税額控除ではない）"),
        statement(
            &["小規模企業共済", "一時所得", "共済金"],
            &[],
            "小規模企業共済の共済金は退職所得（一時所得ではない）",
        ),
        statement(
            &["老齢基礎年金", "満額", "816,000"],
            &["2024年度価額"],
            "老齢基礎年金の満額816,000円は旧価額、2025年度831,700円に更新必要",
        ),
        statement(
            &["相続税", "基礎控除", "500万円×法定相続人"],
            &[],
            "相続税基礎控除は600万円×法定相続人（500万円は古い）",
        ),
        structural(Check::ChoiceCount, "選択肢数が不正", Severity::High),
        structural(Check::DuplicateChoices, "選択肢の重複", Severity::High),
        structural(Check::Markup, "HTMLタグが残存", Severity::High),
        structural(Check::StatementNumbering, "問題文に選択肢番号が残存", Severity::High),
        structural(Check::ChoiceNumbering, "選択肢に番号が残存", Severity::Medium),
    ]
}
