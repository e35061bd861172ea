use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::audit::choice_key;
use crate::audit::rules::RuleSet;
use crate::audit::validate::{assess, Risk};
use crate::dataset::{placeholder_text, Choice, QuestionRecord, Status};
use crate::parser::build::pad_choices;
use crate::parser::choices::{self, clean_choice, has_inline_marker};
use crate::parser::normalize::{self, has_markup};
use crate::settings::Settings;

pub const UPDATED_NOTE: &str = "※2025年法令基準日対応版に修正済み";
pub const INVALID_REASON: &str = "法令改正により内容が不正確";

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\d,])(?:795,000|816,000|780,900)").unwrap());
static VALUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:20\d{2}|平成\d+)年度価額").unwrap());

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixCounts {
    pub markup: usize,
    pub split_numbering: usize,
    pub choice_count: usize,
    pub duplicates: usize,
    pub updated: usize,
    pub invalidated: usize,
    pub marked_valid: usize,
}

impl FixCounts {
    pub fn changes(&self) -> usize {
        self.markup
            + self.split_numbering
            + self.choice_count
            + self.duplicates
            + self.updated
            + self.invalidated
            + self.marked_valid
    }

    pub fn print(&self) {
        println!("\n--- Fixes ---");
        println!("  markup stripped:     {}", self.markup);
        println!("  numbering split:     {}", self.split_numbering);
        println!("  choice count fixed:  {}", self.choice_count);
        println!("  duplicates replaced: {}", self.duplicates);
        println!("  amounts updated:     {}", self.updated);
        println!("  marked invalid:      {}", self.invalidated);
        println!("  marked valid:        {}", self.marked_valid);
    }
}

/// Run every fix pass over each active record, in order: markup, statement
/// numbering, choice count, duplicates, outdated content. Records that come
/// through without a status are marked valid. Running twice changes nothing
/// the second time.
pub fn apply_all(records: &mut [QuestionRecord], rules: &RuleSet, settings: &Settings) -> FixCounts {
    let mut counts = FixCounts::default();

    for record in records.iter_mut() {
        if !record.is_active() {
            continue;
        }
        if strip_markup(record) {
            counts.markup += 1;
        }
        if split_numbered_statement(record, settings.min_statement_chars) {
            counts.split_numbering += 1;
        }
        if !record.is_active() {
            continue;
        }
        if normalize_choice_count(record, settings.target_choices) {
            counts.choice_count += 1;
        }
        if dedupe_choices(record) {
            counts.duplicates += 1;
        }
        match update_outdated(record, rules, settings.target_choices) {
            Outdated::Current => {}
            Outdated::Updated => counts.updated += 1,
            Outdated::Invalidated => counts.invalidated += 1,
        }
        if record.status.is_none() {
            record.status = Some(Status::Valid);
            counts.marked_valid += 1;
        }
    }

    info!(changes = counts.changes(), "fix passes complete");
    counts
}

/// Remove leftover highlight tags from the statement and choices.
pub fn strip_markup(record: &mut QuestionRecord) -> bool {
    let mut changed = false;
    if has_markup(&record.statement) {
        record.statement = normalize::strip_markup(&record.statement).trim().to_string();
        changed = true;
    }
    for choice in record.choices.iter_mut() {
        if has_markup(&choice.text) {
            let text = clean_choice(&normalize::strip_markup(&choice.text));
            *choice = if text.is_empty() {
                Choice::placeholder(choice.id)
            } else {
                Choice::new(choice.id, text)
            };
            changed = true;
        }
    }
    if changed {
        record.mark_fixed("HTMLタグを除去");
    }
    changed
}

/// Move `N）` options that leaked into the statement into their choice slots.
/// Only empty or placeholder slots are filled; genuine choices win.
pub fn split_numbered_statement(record: &mut QuestionRecord, min_statement_chars: usize) -> bool {
    if !has_inline_marker(&record.statement) {
        return false;
    }
    let (head, segments) = choices::split(&record.statement);
    record.statement = head.trim().to_string();

    for (n, raw) in segments {
        let text = clean_choice(&raw);
        let key = choice_key(&text);
        if text.is_empty() || record.choices.iter().any(|c| choice_key(&c.text) == key) {
            continue;
        }
        match record.choices.iter_mut().find(|c| c.id == n) {
            Some(slot) if slot.is_placeholder() || slot.text.trim().is_empty() => {
                *slot = Choice::new(n, text);
            }
            Some(_) => {}
            None => record.choices.push(Choice::new(n, text)),
        }
    }
    record.choices.sort_by_key(|c| c.id);

    if record.statement.chars().count() < min_statement_chars {
        record.mark_invalid("選択肢分離後の問題文が短すぎる");
    } else {
        record.mark_fixed("問題文内の選択肢番号を分離");
    }
    true
}

fn in_shape(choices: &[Choice], target: usize) -> bool {
    choices.len() == target
        && choices.iter().zip(1u32..).all(|(c, id)| {
            c.id == id && (!c.is_placeholder() || (c.placeholder && c.text == placeholder_text(id)))
        })
}

/// Truncate or pad to exactly `target` choices numbered 1..=target. An answer
/// follows its choice through renumbering and is cleared if the choice goes.
pub fn normalize_choice_count(record: &mut QuestionRecord, target: usize) -> bool {
    if in_shape(&record.choices, target) {
        return false;
    }
    let old_answer = record.answer_id.take();
    record.choices.truncate(target);

    for (choice, id) in record.choices.iter_mut().zip(1u32..) {
        if old_answer == Some(choice.id) && !choice.is_placeholder() {
            record.answer_id = Some(id);
        }
        if choice.is_placeholder() {
            *choice = Choice::placeholder(id);
        } else {
            choice.id = id;
        }
    }
    pad_choices(&mut record.choices, target);

    record.mark_fixed(&format!("選択肢数を{}個に調整", target));
    true
}

/// Replace every repeat of an earlier choice with a placeholder. The first
/// occurrence keeps its text; an answer on a repeat moves to it.
pub fn dedupe_choices(record: &mut QuestionRecord) -> bool {
    let mut seen: Vec<(String, u32)> = Vec::new();
    let mut changed = false;

    for choice in record.choices.iter_mut() {
        if choice.is_placeholder() {
            continue;
        }
        let key = choice_key(&choice.text);
        match seen.iter().find(|(k, _)| *k == key) {
            Some(&(_, first)) => {
                if record.answer_id == Some(choice.id) {
                    record.answer_id = Some(first);
                }
                debug!(record = record.id, choice = choice.id, "duplicate choice replaced");
                *choice = Choice::placeholder(choice.id);
                changed = true;
            }
            None => seen.push((key, choice.id)),
        }
    }
    if changed {
        record.mark_fixed("重複選択肢を補完選択肢に置換");
    }
    changed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outdated {
    Current,
    Updated,
    Invalidated,
}

/// Bring superseded pension figures up to the 2025 values. The update is kept
/// only if the refreshed record passes with no high finding at all; rewriting
/// several old amounts to the same figure collapses the choices, so such a
/// record is retired with its text untouched, like anything else the rules
/// call out as outdated.
pub fn update_outdated(record: &mut QuestionRecord, rules: &RuleSet, target_choices: usize) -> Outdated {
    if !record.is_active() || !assess(record, rules, target_choices).needs_factual_fix() {
        return Outdated::Current;
    }

    let mut refreshed = record.clone();
    if refresh_amounts(&mut refreshed) && assess(&refreshed, rules, target_choices).risk != Risk::NeedsFix {
        if !refreshed.explanation.contains(UPDATED_NOTE) {
            refreshed.explanation.push('\n');
            refreshed.explanation.push_str(UPDATED_NOTE);
        }
        refreshed.mark_fixed("年金額を2025年度価額に更新");
        *record = refreshed;
        return Outdated::Updated;
    }

    record.mark_invalid(INVALID_REASON);
    Outdated::Invalidated
}

fn refresh_text(text: &mut String) -> bool {
    let amounts = AMOUNT_RE.replace_all(text, "${1}831,700");
    let updated = VALUATION_RE.replace_all(&amounts, "2025年度価額").into_owned();
    if updated == *text {
        return false;
    }
    *text = updated;
    true
}

fn refresh_amounts(record: &mut QuestionRecord) -> bool {
    let mut changed = refresh_text(&mut record.statement);
    for choice in record.choices.iter_mut().filter(|c| !c.is_placeholder()) {
        changed |= refresh_text(&mut choice.text);
    }
    changed |= refresh_text(&mut record.explanation);
    changed
}
