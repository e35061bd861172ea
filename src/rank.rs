use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::{QuestionRecord, Tier};
use crate::error::{self, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keywords: Vec<String>,
    pub weight: f64,
}

/// Topic table: tier → weighted keyword sets. Iteration order is A..D, which
/// is also the tie-break precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankTable {
    pub tiers: BTreeMap<Tier, Vec<KeywordEntry>>,
}

impl RankTable {
    pub fn load(path: &Path) -> Result<RankTable> {
        let table: RankTable = error::read_json(path)?;
        table.checked()
    }

    pub fn load_or_builtin(path: Option<&Path>) -> Result<RankTable> {
        match path {
            Some(p) => RankTable::load(p),
            None => builtin_table().checked(),
        }
    }

    fn checked(self) -> Result<RankTable> {
        if self.tiers.values().all(|entries| entries.is_empty()) {
            return Err(Error::EmptyTable("rank"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankOutcome {
    /// Tier of the best-scoring keyword entry.
    pub keyword_tier: Tier,
    /// Tier after the weight thresholds are applied; this is what gets stored.
    pub tier: Tier,
    pub weight: f64,
}

fn threshold_tier(weight: f64) -> Tier {
    if weight >= 80.0 {
        Tier::A
    } else if weight >= 60.0 {
        Tier::B
    } else if weight >= 30.0 {
        Tier::C
    } else {
        Tier::D
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Score = matched keywords / entry keywords × entry weight, best entry wins.
/// Only a strictly higher score replaces the current best, so on ties the
/// earlier tier keeps it. The winning weight is then re-mapped through fixed
/// thresholds, which may move the tier away from the keyword tier.
pub fn classify(record: &QuestionRecord, table: &RankTable) -> RankOutcome {
    let text = record.full_text().to_lowercase();
    let mut best = 0.0;
    let mut keyword_tier = Tier::D;

    for (tier, entries) in &table.tiers {
        for entry in entries.iter().filter(|e| !e.keywords.is_empty()) {
            let hits = entry
                .keywords
                .iter()
                .filter(|k| text.contains(&k.to_lowercase()))
                .count();
            let score = hits as f64 / entry.keywords.len() as f64 * entry.weight;
            if score > best {
                best = score;
                keyword_tier = *tier;
            }
        }
    }

    RankOutcome {
        keyword_tier,
        tier: threshold_tier(best),
        weight: round1(best),
    }
}

/// Rank every active record in place; returns outcomes aligned with the input.
/// Retired records get `None` and lose any rank they carried.
pub fn rank_all(records: &mut [QuestionRecord], table: &RankTable) -> Vec<Option<RankOutcome>> {
    let outcomes: Vec<Option<RankOutcome>> = records
        .par_iter()
        .map(|r| r.is_active().then(|| classify(r, table)))
        .collect();
    for (record, outcome) in records.iter_mut().zip(&outcomes) {
        record.rank = outcome.map(|o| o.tier);
        record.importance_weight = outcome.map(|o| o.weight);
    }
    outcomes
}

fn entry(keywords: &[&str], weight: f64) -> KeywordEntry {
    KeywordEntry {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        weight,
    }
}

/// FP3 topic frequencies.
pub fn builtin_table() -> RankTable {
    let mut tiers = BTreeMap::new();
    tiers.insert(
        Tier::A,
        vec![
            entry(&["老齢基礎年金", "年金額", "満額"], 100.0),
            entry(&["厚生年金", "老齢給付"], 95.0),
            entry(&["遺族年金", "遺族基礎年金"], 90.0),
            entry(&["相続税", "基礎控除", "3,000万円", "600万円"], 100.0),
            entry(&["法定相続人", "相続分"], 95.0),
            entry(&["贈与税", "110万円", "基礎控除"], 90.0),
            entry(&["住宅ローン控除", "住宅借入金等特別控除"], 85.0),
            entry(&["小規模企業共済", "掛金", "70,000円"], 80.0),
        ],
    );
    tiers.insert(
        Tier::B,
        vec![
            entry(&["確定拠出年金", "iDeCo", "個人型"], 70.0),
            entry(&["健康保険", "一部負担金", "3割"], 65.0),
            entry(&["高額療養費", "21,000円"], 60.0),
            entry(&["建築基準法", "建ぺい率", "容積率"], 65.0),
            entry(&["借地権", "相続税評価"], 60.0),
            entry(&["NISA", "新NISA", "投資枠"], 65.0),
            entry(&["投資信託", "シャープレシオ"], 55.0),
            entry(&["給与所得控除", "給与収入"], 60.0),
            entry(&["一時所得", "特別控除", "50万円"], 55.0),
        ],
    );
    tiers.insert(
        Tier::C,
        vec![
            entry(&["生命保険", "死亡保険金", "非課税"], 45.0),
            entry(&["医療保険", "加入"], 40.0),
            entry(&["株式", "PER", "PBR"], 45.0),
            entry(&["配当利回り", "配当性向"], 40.0),
            entry(&["所得控除", "税額控除"], 40.0),
            entry(&["退職所得", "退職金"], 35.0),
            entry(&["定期借地権", "事業用"], 35.0),
            entry(&["登記", "登録免許税"], 30.0),
        ],
    );
    tiers.insert(
        Tier::D,
        vec![
            entry(&["障害年金", "障害等級"], 20.0),
            entry(&["育児休業給付", "支給率"], 20.0),
            entry(&["事業承継", "特例"], 15.0),
            entry(&["農地", "転用"], 10.0),
        ],
    );
    RankTable { tiers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Choice, QuestionType, EXPLANATION_PLACEHOLDER};

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

    fn table(rows: &[(Tier, &[&str], f64)]) -> RankTable {
        let mut tiers: BTreeMap<Tier, Vec<KeywordEntry>> = BTreeMap::new();
        for (tier, keywords, weight) in rows {
            tiers.entry(*tier).or_default().push(entry(keywords, *weight));
        }
        RankTable { tiers }
    }

    #[test]
    fn full_match_on_top_entry_is_a() {
        let r = record("老齢基礎年金の満額の年金額はいくらか。", &["831,700円", "816,000円"]);
        let out = classify(&r, &builtin_table());
        assert_eq!(out.keyword_tier, Tier::A);
        assert_eq!(out.tier, Tier::A);
        assert_eq!(out.weight, 100.0);
    }

    #[test]
    fn threshold_remap_can_move_the_tier() {
        // 2 of 3 keywords on a weight-100 A entry scores 66.7 → B
        let r = record("老齢基礎年金の満額として正しいものはどれか。", &["a", "b"]);
        let out = classify(&r, &builtin_table());
        assert_eq!(out.keyword_tier, Tier::A);
        assert_eq!(out.tier, Tier::B);
        assert_eq!(out.weight, 66.7);

        // a full C-tier hit at weight 90 lands in A
        let t = table(&[(Tier::C, &["登記"], 90.0)]);
        let out = classify(&record("登記の効力について", &[]), &t);
        assert_eq!((out.keyword_tier, out.tier), (Tier::C, Tier::A));
    }

    #[test]
    fn ties_go_to_the_earlier_tier() {
        let t = table(&[(Tier::B, &["株式"], 50.0), (Tier::C, &["株式"], 50.0)]);
        let out = classify(&record("株式の配当について", &[]), &t);
        assert_eq!(out.keyword_tier, Tier::B);
        assert_eq!(out.tier, Tier::C);
    }

    #[test]
    fn no_match_is_d_with_zero_weight() {
        let out = classify(&record("関係のない文章です。", &["x"]), &builtin_table());
        assert_eq!(out.keyword_tier, Tier::D);
        assert_eq!(out.tier, Tier::D);
        assert_eq!(out.weight, 0.0);
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let out = classify(&record("ideco（個人型確定拠出年金）の拠出限度額", &[]), &builtin_table());
        assert_eq!(out.keyword_tier, Tier::B);
        assert_eq!(out.weight, 70.0);
    }

    #[test]
    fn ranking_is_deterministic() {
        let text = std::fs::read_to_string("tests/fixtures/defective_questions.json").unwrap();
        let mut a: Vec<QuestionRecord> = serde_json::from_str(&text).unwrap();
        let mut b = a.clone();
        let t = builtin_table();
        assert_eq!(rank_all(&mut a, &t), rank_all(&mut b, &t));
        assert_eq!(a, b);
        assert!(a.iter().all(|r| r.rank.is_some() && r.importance_weight.is_some()));
    }

    #[test]
    fn retired_records_are_not_ranked() {
        let mut retired = record("老齢基礎年金の満額の年金額はいくらか。", &["a", "b", "c"]);
        retired.rank = Some(Tier::A);
        retired.importance_weight = Some(100.0);
        retired.mark_invalid("古い制度");
        let mut records = vec![retired, record("相続税の基礎控除", &[])];

        let outcomes = rank_all(&mut records, &builtin_table());
        assert_eq!(outcomes[0], None);
        assert!(outcomes[1].is_some());
        assert_eq!((records[0].rank, records[0].importance_weight), (None, None));
        assert!(records[1].rank.is_some());
    }

    #[test]
    fn table_json_round_trip_and_empty_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranks.json");
        error::write_json(&path, &builtin_table()).unwrap();
        assert_eq!(RankTable::load(&path).unwrap(), builtin_table());

        std::fs::write(&path, r#"{"A": []}"#).unwrap();
        assert!(matches!(RankTable::load(&path), Err(Error::EmptyTable("rank"))));
    }
}
