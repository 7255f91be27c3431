// src/logging.rs
//
// Output sinks for the simulator.
// - TrialSink: one record per completed trial (+ Q-table at the end)
// - StepSink:  one record per environment tick
// - NoopSink:  discards everything
// - CsvTrialSink: trial log as CSV with a Q-table text file beside it
// - JsonlStepSink: one JSON object per tick
//
// Also installs the tracing subscriber used by the binaries.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::environment::{Parameters, StepStatus};
use crate::error::Result;
use crate::sim::{TrialRecord, TrialTicket};

/// Column order of the trial log.
pub const TRIAL_LOG_FIELDS: [&str; 8] = [
    "trial",
    "testing",
    "parameters",
    "initial_deadline",
    "final_deadline",
    "net_reward",
    "actions",
    "success",
];

/// Receives completed trials.
pub trait TrialSink {
    fn log_trial(&mut self, record: &TrialRecord) -> Result<()>;

    /// Called once at the end of the run. `q_table` is present only for
    /// learning agents.
    fn finish(&mut self, q_table: Option<&str>) -> Result<()>;
}

/// Receives every tick of every trial.
pub trait StepSink {
    fn log_step(&mut self, ticket: &TrialTicket, status: &StepStatus) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TrialSink for NoopSink {
    fn log_trial(&mut self, _record: &TrialRecord) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _q_table: Option<&str>) -> Result<()> {
        Ok(())
    }
}

impl StepSink for NoopSink {
    fn log_step(&mut self, _ticket: &TrialTicket, _status: &StepStatus) -> Result<()> {
        Ok(())
    }
}

fn python_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// Trial log row, in `TRIAL_LOG_FIELDS` order.
///
/// `parameters` and `actions` are written as dict literals and `testing` as
/// True/False so existing analysis scripts read the file unchanged.
pub fn trial_log_row(record: &TrialRecord) -> [String; 8] {
    [
        record.trial().to_string(),
        python_bool(record.testing()).to_string(),
        Parameters {
            e: record.epsilon(),
            a: record.alpha(),
        }
        .to_string(),
        record.initial_deadline().to_string(),
        record.final_deadline().to_string(),
        format!("{:?}", record.net_reward()),
        record.actions().to_string(),
        u8::from(record.success()).to_string(),
    ]
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

/// CSV trial log plus optional Q-table file.
///
/// Both files are created (and truncated) up front; rows are flushed as
/// they arrive so a crash keeps every completed trial.
pub struct CsvTrialSink {
    writer: csv::Writer<File>,
    log_path: PathBuf,
    table: Option<(PathBuf, File)>,
}

impl CsvTrialSink {
    pub fn create(log_path: &Path, table_path: Option<&Path>) -> Result<Self> {
        ensure_parent(log_path)?;
        let mut writer = csv::Writer::from_path(log_path)?;
        writer.write_record(TRIAL_LOG_FIELDS)?;
        writer.flush()?;

        let table = match table_path {
            Some(p) => {
                ensure_parent(p)?;
                Some((p.to_path_buf(), File::create(p)?))
            }
            None => None,
        };

        info!(path = %log_path.display(), "trial log opened");
        Ok(Self {
            writer,
            log_path: log_path.to_path_buf(),
            table,
        })
    }
}

impl TrialSink for CsvTrialSink {
    fn log_trial(&mut self, record: &TrialRecord) -> Result<()> {
        self.writer.write_record(trial_log_row(record))?;
        self.writer.flush()?;
        Ok(())
    }

    fn finish(&mut self, q_table: Option<&str>) -> Result<()> {
        self.writer.flush()?;
        if let (Some(text), Some((path, file))) = (q_table, self.table.as_mut()) {
            file.write_all(text.as_bytes())?;
            file.flush()?;
            info!(path = %path.display(), "Q-table written");
        }
        debug!(path = %self.log_path.display(), "trial log closed");
        Ok(())
    }
}

#[derive(Serialize)]
struct StepLine<'a> {
    phase: &'a str,
    trial: u32,
    #[serde(flatten)]
    status: &'a StepStatus,
}

/// JSONL sink: one object per tick.
pub struct JsonlStepSink {
    writer: BufWriter<File>,
}

impl JsonlStepSink {
    pub fn create(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let file = File::create(path)?;
        info!(path = %path.display(), "step log opened");
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl StepSink for JsonlStepSink {
    fn log_step(&mut self, ticket: &TrialTicket, status: &StepStatus) -> Result<()> {
        let line = StepLine {
            phase: if ticket.testing() { "testing" } else { "training" },
            trial: ticket.trial,
            status,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Install a compact stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Returns an
/// error if a global subscriber already exists.
pub fn init_tracing(
    default_level: &str,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
}
