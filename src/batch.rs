use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::dataset::QuestionRecord;
use crate::error;
use crate::parser::build::AnswerPolicy;
use crate::parser::choices::Limits;
use crate::parser::{self, DroppedSpan};

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<FileCounts, error::Error>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileCounts {
    pub records: usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<QuestionRecord>,
    pub dropped: Vec<DroppedSpan>,
    pub files: Vec<FileOutcome>,
}

impl Batch {
    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.result.is_err())
    }

    pub fn files_ok(&self) -> usize {
        self.files.len() - self.failed().count()
    }
}

fn progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Extract every file in order. Ids run sequentially across the whole batch;
/// a file that cannot be read is recorded and skipped.
pub fn extract_files(paths: &[PathBuf], limits: &Limits, policy: &dyn AnswerPolicy) -> Batch {
    let pb = progress(paths.len());
    let mut batch = Batch::default();
    let mut next_id = 1;

    for path in paths {
        pb.set_message(short_name(path));
        let result = error::read_file(path).map(|raw| {
            let outcome = parser::process_text(&raw, &mut next_id, limits, policy);
            let counts = FileCounts {
                records: outcome.records.len(),
                dropped: outcome.dropped.len(),
            };
            info!(file = %path.display(), records = counts.records, dropped = counts.dropped, "extracted");
            batch.records.extend(outcome.records);
            batch.dropped.extend(outcome.dropped);
            counts
        });
        if let Err(e) = &result {
            warn!(file = %path.display(), error = %e, "file skipped");
        }
        batch.files.push(FileOutcome {
            path: path.clone(),
            result,
        });
        pb.inc(1);
    }

    pb.finish_and_clear();
    batch
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
