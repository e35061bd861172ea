use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::audit::validate::{Assessment, Risk};
use crate::dataset::{QuestionRecord, QuestionType, Status, Tier};
use crate::rank::RankOutcome;

const TIER_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub id: u32,
    pub statement: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub counts: BTreeMap<Risk, usize>,
    pub results: BTreeMap<Risk, Vec<ReportEntry>>,
    /// Ids of records `fix` marked invalid; they sit outside the risk labels.
    pub retired: Vec<u32>,
}

impl ValidationReport {
    /// `assessments` must line up with `records`.
    pub fn new(records: &[QuestionRecord], assessments: &[Assessment], preview_chars: usize) -> Self {
        let mut results: BTreeMap<Risk, Vec<ReportEntry>> =
            Risk::ALL.iter().map(|r| (*r, Vec::new())).collect();
        let mut retired = Vec::new();
        for (record, a) in records.iter().zip(assessments) {
            if !record.is_active() {
                retired.push(record.id);
                continue;
            }
            results.entry(a.risk).or_default().push(ReportEntry {
                id: record.id,
                statement: record.preview(preview_chars),
                issues: a.issues(),
            });
        }
        let counts = results.iter().map(|(k, v)| (*k, v.len())).collect();
        ValidationReport {
            generated_at: Utc::now(),
            total: records.len(),
            counts,
            results,
            retired,
        }
    }

    pub fn count(&self, risk: Risk) -> usize {
        self.counts.get(&risk).copied().unwrap_or(0)
    }

    pub fn print(&self) {
        println!("\n--- Validation ({} records) ---", self.total);
        for risk in Risk::ALL {
            println!("  {:<13} {}", risk.label(), self.count(risk));
        }
        if !self.retired.is_empty() {
            println!("  {:<13} {}", "retired", self.retired.len());
        }
        for entry in self.results.get(&Risk::NeedsFix).into_iter().flatten().take(10) {
            println!("  #{:<5} {}", entry.id, entry.issues.join(" | "));
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSummary {
    pub tier: Tier,
    pub description: &'static str,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub id: u32,
    pub rank: Tier,
    pub importance_weight: f64,
    pub keyword_rank: Tier,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub counts: BTreeMap<Tier, usize>,
    pub tiers: Vec<TierSummary>,
    pub records: Vec<RankEntry>,
    pub retired: usize,
}

impl RankingReport {
    /// `outcomes` must line up with `records`; `None` marks a retired record.
    pub fn new(records: &[QuestionRecord], outcomes: &[Option<RankOutcome>], preview_chars: usize) -> Self {
        let ranked: Vec<(&QuestionRecord, &RankOutcome)> = records
            .iter()
            .zip(outcomes)
            .filter_map(|(r, o)| o.as_ref().map(|o| (r, o)))
            .collect();
        let entries: Vec<RankEntry> = ranked
            .iter()
            .map(|(r, o)| RankEntry {
                id: r.id,
                rank: o.tier,
                importance_weight: o.weight,
                keyword_rank: o.keyword_tier,
            })
            .collect();

        let tiers: Vec<TierSummary> = Tier::ALL
            .iter()
            .map(|tier| {
                let members: Vec<&QuestionRecord> = ranked
                    .iter()
                    .filter(|(_, o)| o.tier == *tier)
                    .map(|(r, _)| *r)
                    .collect();
                TierSummary {
                    tier: *tier,
                    description: tier.description(),
                    count: members.len(),
                    examples: members
                        .iter()
                        .take(TIER_EXAMPLES)
                        .map(|r| r.preview(preview_chars))
                        .collect(),
                }
            })
            .collect();

        RankingReport {
            generated_at: Utc::now(),
            total: ranked.len(),
            counts: tiers.iter().map(|t| (t.tier, t.count)).collect(),
            tiers,
            records: entries,
            retired: records.len() - ranked.len(),
        }
    }

    pub fn print(&self) {
        println!("\n--- Ranking ({} records, {} retired) ---", self.total, self.retired);
        for t in &self.tiers {
            println!("  {} {:<20} {}", t.tier, t.description, t.count);
        }
    }
}

/// Dataset breakdown for `stats`.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_rank: BTreeMap<String, usize>,
    pub placeholder_choices: usize,
    pub unverified_answers: usize,
}

impl DatasetStats {
    pub fn collect(records: &[QuestionRecord]) -> Self {
        let label = |s: Option<Status>| match s {
            Some(Status::Valid) => "valid",
            Some(Status::Fixed) => "fixed",
            Some(Status::Invalid) => "invalid",
            None => "unchecked",
        };
        DatasetStats {
            total: records.len(),
            by_type: records
                .iter()
                .map(|r| match r.kind {
                    QuestionType::Written => "written".to_string(),
                    QuestionType::Practical => "practical".to_string(),
                })
                .counts()
                .into_iter()
                .collect(),
            by_status: records
                .iter()
                .map(|r| label(r.status).to_string())
                .counts()
                .into_iter()
                .collect(),
            by_rank: records
                .iter()
                .map(|r| r.rank.map_or_else(|| "-".to_string(), |t| t.to_string()))
                .counts()
                .into_iter()
                .collect(),
            placeholder_choices: records
                .iter()
                .flat_map(|r| &r.choices)
                .filter(|c| c.is_placeholder())
                .count(),
            unverified_answers: records.iter().filter(|r| r.answer_id.is_none()).count(),
        }
    }

    pub fn print(&self) {
        println!("Total:        {}", self.total);
        for (k, v) in &self.by_type {
            println!("  {:<11} {}", k, v);
        }
        println!("Status:");
        for (k, v) in &self.by_status {
            println!("  {:<11} {}", k, v);
        }
        println!("Rank:");
        for (k, v) in &self.by_rank {
            println!("  {:<11} {}", k, v);
        }
        println!("Placeholder choices: {}", self.placeholder_choices);
        println!("Unverified answers:  {}", self.unverified_answers);
    }
}

/// End-of-run totals, printed even when some inputs failed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunTotals {
    pub files_ok: usize,
    pub files_failed: usize,
    pub records: usize,
    pub dropped: usize,
    pub retired: usize,
    pub risk: BTreeMap<Risk, usize>,
}

impl RunTotals {
    pub fn print(&self) {
        println!(
            "Files: {} ok, {} failed. Records: {} produced, {} dropped, {} retired.",
            self.files_ok, self.files_failed, self.records, self.dropped, self.retired,
        );
        if !self.risk.is_empty() {
            let tiers = Risk::ALL
                .iter()
                .map(|r| format!("{} {}", r.label(), self.risk.get(r).copied().unwrap_or(0)))
                .join(", ");
            println!("Validation: {}.", tiers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::fix;
    use crate::audit::rules::RuleSet;
    use crate::audit::validate::validate_all;
    use crate::dataset;
    use crate::rank::{builtin_table, rank_all};
    use crate::settings::Settings;
    use std::path::Path;

    fn fixture() -> Vec<QuestionRecord> {
        dataset::load(Path::new("tests/fixtures/defective_questions.json")).unwrap()
    }

    #[test]
    fn validation_report_groups_by_label() {
        let records = fixture();
        let rules = RuleSet::load_or_builtin(None).unwrap();
        let assessments = validate_all(&records, &rules, 3);
        let report = ValidationReport::new(&records, &assessments, 10);

        assert_eq!(report.total, records.len());
        assert_eq!(report.counts.values().sum::<usize>(), records.len());
        assert_eq!(report.count(Risk::Accurate), 1);

        let v = serde_json::to_value(&report).unwrap();
        assert!(v["generatedAt"].is_string());
        let fix = v["results"]["needs-fix"].as_array().unwrap();
        assert!(fix.iter().any(|e| e["id"] == 1));
        let preview = fix[0]["statement"].as_str().unwrap();
        assert!(preview.chars().count() <= 13);
        assert!(v["results"]["minor"].as_array().is_some());
    }

    #[test]
    fn ranking_report_counts_and_examples() {
        let mut records = fixture();
        let outcomes = rank_all(&mut records, &builtin_table());
        let report = RankingReport::new(&records, &outcomes, 100);

        assert_eq!(report.tiers.len(), 4);
        assert_eq!(report.counts.values().sum::<usize>(), records.len());
        assert!(report.tiers.iter().all(|t| t.examples.len() <= TIER_EXAMPLES));
        assert_eq!(report.tiers[0].description, "超重要（毎回出題レベル）");

        let v = serde_json::to_value(&report).unwrap();
        assert!(v["records"][0]["importanceWeight"].is_number());
        assert!(v["counts"]["A"].is_number());
    }

    #[test]
    fn retired_records_leave_risk_and_tier_counts() {
        let mut records = fixture();
        let rules = RuleSet::load_or_builtin(None).unwrap();
        fix::apply_all(&mut records, &rules, &Settings::default());

        let assessments = validate_all(&records, &rules, 3);
        let validation = ValidationReport::new(&records, &assessments, 100);
        assert_eq!(validation.retired, vec![6]);
        assert_eq!(validation.counts.values().sum::<usize>(), records.len() - 1);
        assert_eq!(validation.count(Risk::NeedsFix), 0);

        let outcomes = rank_all(&mut records, &builtin_table());
        let ranking = RankingReport::new(&records, &outcomes, 100);
        assert_eq!(ranking.retired, 1);
        assert_eq!(ranking.total, records.len() - 1);
        assert!(ranking.records.iter().all(|e| e.id != 6));
        let nisa = records.iter().find(|r| r.id == 6).unwrap();
        assert_eq!((nisa.rank, nisa.importance_weight), (None, None));
    }

    #[test]
    fn stats_count_placeholders_and_unverified() {
        let stats = DatasetStats::collect(&fixture());
        assert_eq!(stats.total, 7);
        assert_eq!(stats.placeholder_choices, 3);
        assert_eq!(stats.unverified_answers, 6);
        assert_eq!(stats.by_type["written"], 5);
        assert_eq!(stats.by_status["unchecked"], 7);
    }
}
