// tests/trial_log_tests.rs
//
// On-disk outputs of a full run: CSV trial log, Q-table dump and JSONL
// step log.

use std::fs;
use std::io;

use smartcab::logging::TRIAL_LOG_FIELDS;
use smartcab::{
    build_environment, AgentProfile, Config, CsvTrialSink, JsonlStepSink, QuitFlag, Simulator,
    TrialRecord, TrialSink,
};

/// Forwards to the CSV sink and requests a quit after `after` trials.
struct QuitAfter {
    inner: CsvTrialSink,
    quit: QuitFlag,
    after: usize,
    logged: usize,
}

impl TrialSink for QuitAfter {
    fn log_trial(&mut self, record: &TrialRecord) -> smartcab::Result<()> {
        self.inner.log_trial(record)?;
        self.logged += 1;
        if self.logged == self.after {
            self.quit.trigger();
        }
        Ok(())
    }

    fn finish(&mut self, q_table: Option<&str>) -> smartcab::Result<()> {
        self.inner.finish(q_table)
    }
}

fn small_run(profile: AgentProfile, seed: u64, dir: &std::path::Path) -> Config {
    let mut cfg = Config::headless(profile, seed);
    cfg.sim.log_metrics = true;
    cfg.sim.log_dir = dir.to_path_buf();
    cfg.sim.n_test = 3;
    cfg.sim.max_training_trials = Some(5);
    cfg
}

#[test]
fn csv_log_has_one_row_per_trial_with_consistent_counts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = small_run(AgentProfile::DefaultLearning, 21, dir.path());

    let sink = CsvTrialSink::create(&cfg.log_path(), cfg.table_path().as_deref()).expect("sink");
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_trial_sink(Box::new(sink));
    let outcome = sim.run().expect("run");
    assert_eq!(outcome.testing().count(), 3);

    let mut reader = csv::Reader::from_path(cfg.log_path()).expect("open csv");
    let headers: Vec<String> = reader
        .headers()
        .expect("headers")
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(headers, TRIAL_LOG_FIELDS.to_vec());

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
    assert_eq!(rows.len(), outcome.records.len());

    for (row, record) in rows.iter().zip(&outcome.records) {
        assert_eq!(&row[0], record.trial().to_string());
        assert_eq!(&row[1], if record.testing() { "True" } else { "False" });
        assert!(row[2].starts_with("{'e': "));

        let initial: i32 = row[3].parse().expect("initial_deadline");
        let final_: i32 = row[4].parse().expect("final_deadline");
        let counts: u32 = row[6]
            .trim_matches(|c| c == '{' || c == '}')
            .split(", ")
            .map(|kv| {
                kv.split(": ")
                    .nth(1)
                    .and_then(|v| v.parse::<u32>().ok())
                    .expect("count")
            })
            .sum();
        assert_eq!(counts as i32, initial - final_);
        assert_eq!(&row[7], if record.success() { "1" } else { "0" });
    }
}

#[test]
fn testing_rows_record_zero_epsilon_and_alpha() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = small_run(AgentProfile::ImprovedLearning, 4, dir.path());
    let sink = CsvTrialSink::create(&cfg.log_path(), cfg.table_path().as_deref()).expect("sink");
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_trial_sink(Box::new(sink));
    let outcome = sim.run().expect("run");

    for r in outcome.testing() {
        assert_eq!(r.epsilon(), 0.0);
        assert_eq!(r.alpha(), 0.0);
    }
    let text = fs::read_to_string(cfg.log_path()).expect("read");
    assert!(text.contains("True,\"{'e': 0.0, 'a': 0.0}\""));
}

#[test]
fn learning_run_writes_q_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = small_run(AgentProfile::DefaultLearning, 8, dir.path());
    let table_path = cfg.table_path().expect("learning profile has a table");

    let sink = CsvTrialSink::create(&cfg.log_path(), Some(&table_path)).expect("sink");
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_trial_sink(Box::new(sink));
    sim.run().expect("run");

    let table = fs::read_to_string(&table_path).expect("table");
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[0].contains("States"));
    assert!(lines[1].starts_with("waypoint  light"));
    assert!(lines.len() > 3, "learning agent visited at least one state");
    let body = &lines[3..];
    let mut sorted = body.to_vec();
    sorted.sort();
    assert_eq!(body, sorted.as_slice());
}

#[test]
fn no_learning_run_has_no_table_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = small_run(AgentProfile::NoLearning, 2, dir.path());
    assert!(cfg.table_path().is_none());

    let sink = CsvTrialSink::create(&cfg.log_path(), None).expect("sink");
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_trial_sink(Box::new(sink));
    let outcome = sim.run().expect("run");

    assert_eq!(outcome.training().count(), 2);
    assert!(dir.path().join("sim_no-learning.csv").exists());
    assert!(!dir.path().join("sim_no-learning.txt").exists());
}

#[test]
fn step_log_has_one_line_per_step() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = Config::headless(AgentProfile::NoLearning, 13);
    cfg.sim.n_test = 1;
    let path = dir.path().join("steps.jsonl");

    let sink = JsonlStepSink::create(&path).expect("sink");
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_step_sink(Box::new(sink));
    let outcome = sim.run().expect("run");

    let total_steps: i32 = outcome.records.iter().map(|r| r.steps()).sum();
    let text = fs::read_to_string(&path).expect("read");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json"))
        .collect();
    assert_eq!(lines.len() as i32, total_steps);
    assert_eq!(lines[0]["phase"], "training");
    assert_eq!(lines[0]["trial"], 1);
    assert_eq!(lines[0]["t"], 0);
    assert!(lines.last().is_some_and(|l| l["phase"] == "testing"));
}

#[test]
fn interrupted_run_keeps_completed_rows_and_writes_q_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cfg = small_run(AgentProfile::DefaultLearning, 17, dir.path());
    cfg.sim.max_training_trials = Some(10);
    let table_path = cfg.table_path().expect("learning profile has a table");

    let quit = QuitFlag::new();
    let sink = QuitAfter {
        inner: CsvTrialSink::create(&cfg.log_path(), Some(&table_path)).expect("sink"),
        quit: quit.clone(),
        after: 2,
        logged: 0,
    };
    let mut sim = Simulator::new(build_environment(&cfg), cfg.sim.clone())
        .with_output(Box::new(io::sink()))
        .with_quit_flag(quit)
        .with_trial_sink(Box::new(sink));
    let outcome = sim.run().expect("run");

    assert!(outcome.interrupted);
    assert_eq!(outcome.records.len(), 2);

    let mut reader = csv::Reader::from_path(cfg.log_path()).expect("open csv");
    assert_eq!(reader.records().count(), 2);

    let table = fs::read_to_string(&table_path).expect("table");
    assert!(table.lines().next().is_some_and(|l| l.contains("States")));
    assert!(table.lines().count() > 3, "two trials visit at least one state");
}
