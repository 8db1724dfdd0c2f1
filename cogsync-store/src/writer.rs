use crate::error::StoreError;
use crate::record::SessionRecord;
use cogsync_acquisition::SignalBuffer;
use cogsync_core::{BlockSummary, TrialRecord};
use csv::{ReaderBuilder, Writer, WriterBuilder};
use ndarray::Array2;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TRIAL_HEADER: [&str; 8] = [
    "block",
    "round",
    "word",
    "is_match",
    "response",
    "reaction_time",
    "is_correct",
    "timestamp",
];

const SUMMARY_TAG: &str = "SUMMARY";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Where each artifact of a session goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub trial_log: PathBuf,
    pub signal: PathBuf,
    pub aux: PathBuf,
    pub timestamps: PathBuf,
    pub markers: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    /// Conventional file names inside one session directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            trial_log: dir.join("trials.csv"),
            signal: dir.join("signal.csv"),
            aux: dir.join("aux.csv"),
            timestamps: dir.join("timestamps.csv"),
            markers: dir.join("markers.csv"),
            metadata: dir.join("session.json"),
        }
    }
}

/// Append-only trial log plus the one-shot artifacts written at teardown.
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    paths: ArtifactPaths,
}

impl PersistenceWriter {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Opens the trial log for appending, writing the header only if the log is new or empty.
    fn open_log(&self) -> Result<Writer<File>, StoreError> {
        let path = &self.paths.trial_log;
        ensure_parent(path)?;
        let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(TRIAL_HEADER)?;
            debug!(path = %path.display(), "trial log header written");
        }
        Ok(writer)
    }

    /// Appends fully scored trials. Nothing is written if any row is incomplete.
    pub fn append_trials(&self, rows: &[TrialRecord]) -> Result<usize, StoreError> {
        if let Some(t) = rows.iter().find(|t| !t.is_complete()) {
            return Err(StoreError::IncompleteTrial {
                block: t.block,
                round: t.round,
                index: t.index,
            });
        }
        let mut writer = self.open_log()?;
        for trial in rows {
            writer.write_record(trial_row(trial))?;
        }
        writer.flush()?;
        debug!(rows = rows.len(), "trials appended");
        Ok(rows.len())
    }

    pub fn append_summary(&self, summary: &BlockSummary) -> Result<(), StoreError> {
        let mut writer = self.open_log()?;
        writer.write_record([
            SUMMARY_TAG.to_string(),
            summary.block.to_string(),
            if summary.partial { "partial" } else { "complete" }.to_string(),
            summary.correct.to_string(),
            summary.total.to_string(),
            format!("{:.2}", summary.accuracy),
            format!("{:.3}", summary.duration.as_secs_f64()),
            String::new(),
        ])?;
        writer.flush()?;
        info!(
            block = summary.block,
            accuracy = summary.accuracy,
            correct = summary.correct,
            total = summary.total,
            partial = summary.partial,
            "block summary appended"
        );
        Ok(())
    }

    /// Writes each channel group as its own CSV, one sample per row. An empty
    /// buffer produces header-only files.
    pub fn write_signal_artifacts(&self, buffer: &SignalBuffer) -> Result<(), StoreError> {
        write_matrix(&self.paths.signal, "signal", buffer.signal())?;
        write_matrix(&self.paths.aux, "aux", buffer.aux())?;
        write_column(&self.paths.timestamps, "timestamp", buffer.timestamps())?;
        if let Some(markers) = buffer.markers() {
            write_column(&self.paths.markers, "marker", markers)?;
        }
        info!(samples = buffer.len(), "signal artifacts written");
        Ok(())
    }

    pub fn write_session_metadata(&self, record: &SessionRecord) -> Result<(), StoreError> {
        ensure_parent(&self.paths.metadata)?;
        let file = File::create(&self.paths.metadata)?;
        serde_json::to_writer_pretty(file, record)?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn trial_row(trial: &TrialRecord) -> [String; 8] {
    [
        trial.block.to_string(),
        trial.round.to_string(),
        trial.word.clone(),
        trial.is_match.to_string(),
        trial.response.map(|r| r.to_string()).unwrap_or_default(),
        trial
            .reaction_time
            .map(|rt| format!("{:.6}", rt.as_secs_f64()))
            .unwrap_or_default(),
        trial.is_correct.map(|c| c.to_string()).unwrap_or_default(),
        trial.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    ]
}

/// Channels are rows of `data`; the file has one column per channel.
fn write_matrix(path: &Path, prefix: &str, data: &Array2<f64>) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut writer = Writer::from_path(path)?;
    writer.write_record((0..data.nrows()).map(|c| format!("{prefix}_{c}")))?;
    for sample in data.columns() {
        writer.write_record(sample.iter().map(f64::to_string))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_column(path: &Path, name: &str, values: &[f64]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let mut writer = Writer::from_path(path)?;
    writer.write_record([name])?;
    for v in values {
        writer.write_record([v.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One parsed line of a trial log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRow {
    Header,
    Trial {
        block: u32,
        round: u32,
        word: String,
        is_match: bool,
        response: Option<bool>,
        reaction_time: Option<f64>,
        is_correct: Option<bool>,
        timestamp: String,
    },
    Summary {
        block: u32,
        partial: bool,
        correct: usize,
        total: usize,
        accuracy: f64,
        duration_secs: f64,
    },
}

/// Reads a trial log back, header lines included, for inspection and tests.
pub fn read_trial_log(path: impl AsRef<Path>) -> Result<Vec<LogRow>, StoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let malformed = || StoreError::MalformedRow(record.iter().collect::<Vec<_>>().join(","));
        let row = match field(0) {
            "block" => LogRow::Header,
            SUMMARY_TAG => LogRow::Summary {
                block: field(1).parse().map_err(|_| malformed())?,
                partial: field(2) == "partial",
                correct: field(3).parse().map_err(|_| malformed())?,
                total: field(4).parse().map_err(|_| malformed())?,
                accuracy: field(5).parse().map_err(|_| malformed())?,
                duration_secs: field(6).parse().map_err(|_| malformed())?,
            },
            _ => LogRow::Trial {
                block: field(0).parse().map_err(|_| malformed())?,
                round: field(1).parse().map_err(|_| malformed())?,
                word: field(2).to_string(),
                is_match: field(3).parse().map_err(|_| malformed())?,
                response: optional(field(4)).map_err(|_| malformed())?,
                reaction_time: optional(field(5)).map_err(|_| malformed())?,
                is_correct: optional(field(6)).map_err(|_| malformed())?,
                timestamp: field(7).to_string(),
            },
        };
        rows.push(row);
    }
    Ok(rows)
}

fn optional<T: std::str::FromStr>(value: &str) -> Result<Option<T>, T::Err> {
    if value.is_empty() {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}
