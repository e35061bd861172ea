mod audit;
mod batch;
mod dataset;
mod error;
mod parser;
mod rank;
mod report;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use audit::rules::RuleSet;
use audit::{fix, validate};
use parser::build::{AnswerKey, AnswerPolicy, Unverified};
use parser::choices::Limits;
use rank::RankTable;
use report::{DatasetStats, RankingReport, RunTotals, ValidationReport};
use settings::Settings;

#[derive(Parser)]
#[command(name = "fp3_qbank", about = "FP3 question bank: extract, repair, validate and rank")]
struct Cli {
    /// Settings file (default: ./qbank.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse extracted exam text into a question dataset
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Ground-truth answer key ({"id": choiceId, ...})
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Repair markup, numbering, choice count, duplicates and outdated figures
    Fix {
        dataset: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Classify every record against the currency rule table
    Validate {
        dataset: PathBuf,
        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Assign importance tiers
    Rank {
        dataset: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Ingest a ground-truth answer key
    Answers {
        dataset: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Extract, fix, validate and rank in one pass
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Dataset breakdown
    Stats { dataset: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    let result = match cli.command {
        Commands::Extract { files, output, key } => {
            let policy = answer_policy(key.as_deref())?;
            let batch = batch::extract_files(&files, &Limits::from(&settings), policy.as_ref());
            dataset::save(&output, &batch.records)
                .with_context(|| format!("writing {}", output.display()))?;
            totals(&batch, None).print();
            println!("Saved {} records to {}", batch.records.len(), output.display());
            check_failures(&batch)
        }
        Commands::Fix { dataset: input, output } => {
            let mut records = load_dataset(&input)?;
            let rules = RuleSet::load_or_builtin(settings.rules_path.as_deref())?;
            let counts = fix::apply_all(&mut records, &rules, &settings);
            dataset::save(&output, &records)?;
            counts.print();
            Ok(())
        }
        Commands::Validate { dataset: input, output } => {
            let records = load_dataset(&input)?;
            let rules = RuleSet::load_or_builtin(settings.rules_path.as_deref())?;
            let assessments = validate::validate_all(&records, &rules, settings.target_choices);
            let report = ValidationReport::new(&records, &assessments, settings.preview_chars);
            report.print();
            if let Some(path) = output {
                error::write_json(&path, &report)?;
                println!("Report written to {}", path.display());
            }
            Ok(())
        }
        Commands::Rank { dataset: input, output, report } => {
            let mut records = load_dataset(&input)?;
            let table = RankTable::load_or_builtin(settings.ranks_path.as_deref())?;
            let outcomes = rank::rank_all(&mut records, &table);
            dataset::save(&output, &records)?;
            let summary = RankingReport::new(&records, &outcomes, settings.preview_chars);
            summary.print();
            if let Some(path) = report {
                error::write_json(&path, &summary)?;
            }
            Ok(())
        }
        Commands::Answers { dataset: input, key, output } => {
            let mut records = load_dataset(&input)?;
            let key = AnswerKey::load(&key)?;
            let counts = key.apply(&mut records);
            dataset::save(&output, &records)?;
            println!(
                "Answers: {} applied, {} rejected, {} records not in key ({} keys).",
                counts.applied,
                counts.rejected,
                counts.missing,
                key.len()
            );
            Ok(())
        }
        Commands::Run { files, out_dir, key } => {
            let policy = answer_policy(key.as_deref())?;
            let rules = RuleSet::load_or_builtin(settings.rules_path.as_deref())?;
            let table = RankTable::load_or_builtin(settings.ranks_path.as_deref())?;

            let t_extract = Instant::now();
            let mut batch = batch::extract_files(&files, &Limits::from(&settings), policy.as_ref());
            info!(
                records = batch.records.len(),
                elapsed = %format_duration(t_extract.elapsed()),
                "extraction done"
            );

            let counts = fix::apply_all(&mut batch.records, &rules, &settings);
            let assessments =
                validate::validate_all(&batch.records, &rules, settings.target_choices);
            let validation = ValidationReport::new(&batch.records, &assessments, settings.preview_chars);
            let outcomes = rank::rank_all(&mut batch.records, &table);
            let ranking = RankingReport::new(&batch.records, &outcomes, settings.preview_chars);

            dataset::save(&out_dir.join("questions.json"), &batch.records)?;
            error::write_json(&out_dir.join("validation_report.json"), &validation)?;
            error::write_json(&out_dir.join("ranking_report.json"), &ranking)?;

            counts.print();
            validation.print();
            ranking.print();
            println!();
            totals(&batch, Some(&validation)).print();
            println!("Output in {}", out_dir.display());
            check_failures(&batch)
        }
        Commands::Stats { dataset: input } => {
            let records = load_dataset(&input)?;
            DatasetStats::collect(&records).print();
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn answer_policy(key: Option<&Path>) -> anyhow::Result<Box<dyn AnswerPolicy>> {
    Ok(match key {
        Some(path) => {
            let key = AnswerKey::load(path)?;
            info!(entries = key.len(), "answer key loaded");
            Box::new(key)
        }
        None => Box::new(Unverified),
    })
}

fn load_dataset(path: &Path) -> anyhow::Result<Vec<dataset::QuestionRecord>> {
    dataset::load(path).with_context(|| format!("loading dataset {}", path.display()))
}

fn totals(batch: &batch::Batch, validation: Option<&ValidationReport>) -> RunTotals {
    RunTotals {
        files_ok: batch.files_ok(),
        files_failed: batch.failed().count(),
        records: batch.records.len(),
        dropped: batch.dropped.len(),
        retired: batch.records.iter().filter(|r| !r.is_active()).count(),
        risk: validation.map(|v| v.counts.clone()).unwrap_or_default(),
    }
}

fn check_failures(batch: &batch::Batch) -> anyhow::Result<()> {
    let failed: Vec<_> = batch.failed().collect();
    if failed.is_empty() {
        return Ok(());
    }
    for f in &failed {
        if let Err(e) = &f.result {
            eprintln!("  {}: {}", f.path.display(), dataset::preview(&e.to_string(), 120));
        }
    }
    bail!("{} of {} input files failed", failed.len(), batch.files.len())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
