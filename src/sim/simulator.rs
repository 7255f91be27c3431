// src/sim/simulator.rs
//
// Drives an Environment through training and testing trials.
//
// Per trial: reset the environment, step it every `update_delay` seconds of
// wall time until it reports done, then record the outcome (sink + summary
// row). A display, when attached, is rendered every loop iteration and can
// pause or quit the run. Ctrl-C flips the shared QuitFlag, checked once per
// iteration.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::display::{Display, DisplayEvent, Frame};
use crate::environment::Environment;
use crate::error::Result;
use crate::logging::{NoopSink, StepSink, TrialSink};
use crate::metrics::RunSummary;
use crate::report;

use super::controller::{Phase, TrialController, TrialTicket};
use super::record::TrialRecord;

/// Shared stop request, set from the Ctrl-C handler or the display.
#[derive(Debug, Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One record per completed trial, in order.
    pub records: Vec<TrialRecord>,
    /// True when the run stopped on a quit request.
    pub interrupted: bool,
    pub summary: RunSummary,
}

impl RunOutcome {
    pub fn training(&self) -> impl Iterator<Item = &TrialRecord> {
        self.records.iter().filter(|r| r.phase() == Phase::Training)
    }

    pub fn testing(&self) -> impl Iterator<Item = &TrialRecord> {
        self.records.iter().filter(|r| r.phase() == Phase::Testing)
    }
}

pub struct Simulator<E: Environment> {
    env: E,
    cfg: SimConfig,
    display: Option<Box<dyn Display>>,
    trial_sink: Box<dyn TrialSink>,
    step_sink: Box<dyn StepSink>,
    out: Box<dyn Write>,
    quit: QuitFlag,
    paused: bool,
    step_delay: Duration,
    start_time: Instant,
    last_updated: f64,
}

impl<E: Environment> Simulator<E> {
    pub fn new(env: E, cfg: SimConfig) -> Self {
        Self {
            env,
            cfg,
            display: None,
            trial_sink: Box::new(NoopSink),
            step_sink: Box::new(NoopSink),
            out: Box::new(io::stdout()),
            quit: QuitFlag::new(),
            paused: false,
            step_delay: Duration::ZERO,
            start_time: Instant::now(),
            last_updated: 0.0,
        }
    }

    pub fn with_display(mut self, display: Box<dyn Display>) -> Self {
        self.display = Some(display);
        self
    }

    /// Attach the display if it opened; otherwise warn and run headless.
    pub fn with_display_or_headless(self, display: Result<Box<dyn Display>>) -> Self {
        match display {
            Ok(d) => self.with_display(d),
            Err(e) => {
                warn!(error = %e, "display disabled");
                self
            }
        }
    }

    pub fn with_trial_sink(mut self, sink: Box<dyn TrialSink>) -> Self {
        self.trial_sink = sink;
        self
    }

    pub fn with_step_sink(mut self, sink: Box<dyn StepSink>) -> Self {
        self.step_sink = sink;
        self
    }

    /// Where the summary table and Q-table are printed (stdout by default).
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn with_quit_flag(mut self, quit: QuitFlag) -> Self {
        self.quit = quit;
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn into_env(self) -> E {
        self.env
    }

    /// Run training then testing until done or interrupted.
    ///
    /// The end-of-run output (Q-table, sink flush, display shutdown) is
    /// produced even when a trial fails; the first error is returned.
    pub fn run(&mut self) -> Result<RunOutcome> {
        self.step_delay = self.cfg.step_delay()?;

        let mut records = Vec::new();
        let mut summary = RunSummary::default();
        let trials = self.run_trials(&mut records, &mut summary);
        let finished = self.finish();
        let interrupted = trials?;
        finished?;

        Ok(RunOutcome {
            records,
            interrupted,
            summary,
        })
    }

    /// Returns true when the run stopped on a quit request.
    fn run_trials(
        &mut self,
        records: &mut Vec<TrialRecord>,
        summary: &mut RunSummary,
    ) -> Result<bool> {
        let mut controller = TrialController::new(&self.cfg);
        writeln!(self.out, "{}", report::table_header())?;

        loop {
            let ticket = {
                let agent = self.env.primary_agent();
                controller.begin_trial(agent.is_learning(), agent.epsilon())
            };
            let Some(ticket) = ticket else { break };

            self.env.reset(ticket.testing());
            debug!(phase = ?ticket.phase, trial = ticket.trial, "trial started");

            if !self.run_trial(ticket)? {
                controller.stop();
                info!(
                    trial = ticket.trial,
                    completed = controller.completed_trials(),
                    "run interrupted"
                );
                return Ok(true);
            }

            let record =
                TrialRecord::from_trial(ticket, self.env.trial_data(), self.env.primary_agent());
            self.trial_sink.log_trial(&record)?;
            self.emit(&report::format_row(&record, self.cfg.color))?;
            summary.record(&record);
            records.push(record);
            controller.complete_trial();
        }
        Ok(false)
    }

    /// Print a summary or trace line and hand it to the display, which
    /// keeps it visible across redraws.
    fn emit(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{line}")?;
        if let Some(display) = self.display.as_mut() {
            display.log_line(line);
        }
        Ok(())
    }

    fn elapsed(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn frame_delay(&self) -> Duration {
        self.step_delay.max(Duration::from_millis(1))
    }

    /// Returns false when the trial was cut short by a quit request.
    fn run_trial(&mut self, ticket: TrialTicket) -> Result<bool> {
        self.start_time = Instant::now();
        self.last_updated = 0.0;

        if self.cfg.trace_steps {
            let banner = report::trial_banner(self.env.primary_agent());
            self.emit(&banner)?;
        }

        loop {
            if self.quit.is_set() {
                break;
            }

            self.handle_events()?;
            if self.quit.is_set() {
                break;
            }

            let now = self.elapsed();
            if now - self.last_updated >= self.cfg.update_delay {
                self.env.step();
                self.last_updated = now;
                if let Some(status) = self.env.step_status() {
                    self.step_sink.log_step(&ticket, status)?;
                    if self.cfg.trace_steps {
                        let line = report::trace_line(status, self.cfg.color);
                        self.emit(&line)?;
                    }
                }
            }

            if let Some(display) = self.display.as_mut() {
                display.render(&Frame::capture(&self.env, ticket))?;
                thread::sleep(self.frame_delay());
            } else if !self.env.is_done() {
                let due = Duration::from_secs_f64(self.last_updated)
                    .saturating_add(self.step_delay);
                let wait = due.saturating_sub(self.start_time.elapsed());
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }

            if self.env.is_done() {
                break;
            }
        }

        self.step_sink.flush()?;
        Ok(!self.quit.is_set())
    }

    fn handle_events(&mut self) -> Result<()> {
        let Some(display) = self.display.as_mut() else {
            return Ok(());
        };
        for event in display.poll_events() {
            match event {
                DisplayEvent::Quit => self.quit.trigger(),
                DisplayEvent::Pause => self.paused = true,
                DisplayEvent::Key => {}
            }
        }
        if self.paused && !self.quit.is_set() {
            self.pause()?;
        }
        self.paused = false;
        Ok(())
    }

    /// Block until a key arrives; wall time spent paused does not count
    /// toward the step schedule.
    fn pause(&mut self) -> Result<()> {
        let frame_delay = self.frame_delay();
        let Some(display) = self.display.as_mut() else {
            return Ok(());
        };
        let paused_at = Instant::now();
        display.show_paused(true)?;
        info!("simulation paused");

        loop {
            let events = display.poll_events();
            if events.contains(&DisplayEvent::Quit) {
                self.quit.trigger();
            }
            if !events.is_empty() || self.quit.is_set() {
                break;
            }
            thread::sleep(frame_delay);
        }

        display.show_paused(false)?;
        self.start_time += paused_at.elapsed();
        Ok(())
    }

    /// Every step runs even if an earlier one fails; the first error wins.
    fn finish(&mut self) -> Result<()> {
        if let Some(display) = self.display.as_mut() {
            display.shutdown();
        }

        let agent = self.env.primary_agent();
        let table = (self.cfg.log_metrics && agent.is_learning())
            .then(|| report::format_q_table(agent));

        let mut results: Vec<Result<()>> = Vec::with_capacity(4);
        if let Some(table) = &table {
            results.push(writeln!(self.out, "\nQ table:\n\n{table}").map_err(Into::into));
        }
        results.push(self.trial_sink.finish(table.as_deref()));
        results.push(self.step_sink.flush());
        results.push(
            writeln!(self.out, "\nSimulation ended...")
                .and_then(|()| self.out.flush())
                .map_err(Into::into),
        );
        results.into_iter().collect()
    }
}
