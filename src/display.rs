// src/display.rs
//
// Optional live rendering of the simulation.
//
// - Display: what the simulator drives once per loop iteration
// - Frame: read-only snapshot handed to the display
// - TerminalDisplay: ANSI redraw of the grid, the status overlay and the
//   most recent summary rows, with keyboard input read line-by-line on a
//   background thread
//
// The simulator never depends on a display being present; results are the
// same with or without one.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Stdout, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use colored::Colorize;
use tracing::debug;

use crate::environment::{Environment, Scene, StepStatus};
use crate::error::{Result, SimError};
use crate::report;
use crate::sim::TrialTicket;
use crate::types::{Heading, Light, Violation};

pub const PAUSE_TEXT: &str = "Simulation Paused. Press Enter to continue. . .";

/// Summary and trace lines kept on screen under the grid.
pub const HISTORY_LINES: usize = 12;

const HOME: &str = "\x1b[H";
const CLEAR_LINE: &str = "\x1b[K";
const CLEAR_BELOW: &str = "\x1b[J";

/// User input relevant to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Quit,
    Pause,
    /// Any other key; resumes a paused run.
    Key,
}

impl DisplayEvent {
    /// Map one line of terminal input.
    pub fn from_line(line: &str) -> Self {
        match line.trim() {
            "q" | "Q" | "quit" | "exit" => DisplayEvent::Quit,
            "" | "p" | "P" | " " => DisplayEvent::Pause,
            _ => DisplayEvent::Key,
        }
    }
}

/// Everything a display needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub ticket: TrialTicket,
    pub scene: Scene,
    pub status: Option<StepStatus>,
    pub enforce_deadline: bool,
    pub last_success: Option<bool>,
    pub learning: bool,
    pub epsilon: f64,
    pub alpha: f64,
}

impl Frame {
    pub fn capture<E: Environment + ?Sized>(env: &E, ticket: TrialTicket) -> Self {
        let agent = env.primary_agent();
        Self {
            ticket,
            scene: env.scene(),
            status: env.step_status().cloned(),
            enforce_deadline: env.enforce_deadline(),
            last_success: env.last_success(),
            learning: agent.is_learning(),
            epsilon: agent.epsilon(),
            alpha: agent.alpha(),
        }
    }
}

pub trait Display {
    fn render(&mut self, frame: &Frame) -> Result<()>;

    /// Input received since the last call.
    fn poll_events(&mut self) -> Vec<DisplayEvent>;

    fn show_paused(&mut self, paused: bool) -> Result<()>;

    /// A summary row or trace line the simulator just printed.
    fn log_line(&mut self, _line: &str) {}

    fn shutdown(&mut self) {}
}

/// Overlay text for a frame: trial title, last step and trial outcome.
pub fn status_lines(frame: &Frame) -> Vec<String> {
    let mut lines = Vec::new();
    let kind = if frame.ticket.testing() { "Testing" } else { "Training" };
    lines.push(format!("{kind} Trial {}", frame.ticket.trial));

    match &frame.status {
        Some(status) => {
            lines.push(match &status.state {
                Some(state) => format!("Previous State: {state}"),
                None => "!! Agent state not updated!".to_string(),
            });
            lines.push(action_line(status));
            lines.push(outcome_line(status).to_string());
            if frame.enforce_deadline {
                lines.push(format!(
                    "{:.0}% of time remaining to reach destination.",
                    status.time_remaining_pct()
                ));
            } else {
                lines.push("Agent not enforced to meet deadline.".to_string());
            }
        }
        None => lines.push("Simulating trial. . .".to_string()),
    }

    if let Some(success) = frame.last_success {
        lines.push(format!(
            "Previous Trial: {}",
            if success { "Success" } else { "Failure" }
        ));
    }

    if frame.learning {
        lines.push(format!("epsilon = {:.4}", frame.epsilon));
        lines.push(format!("alpha = {:.4}", frame.alpha));
    }
    lines
}

fn action_line(status: &StepStatus) -> String {
    if status.action.is_idle() {
        format!("No action taken. (rewarded {:.2})", status.reward)
    } else if status.violation == Violation::None {
        format!("Agent drove {}. (rewarded {:.2})", status.action, status.reward)
    } else {
        format!("{} attempted (rewarded {:.2})", status.action, status.reward)
    }
}

fn outcome_line(status: &StepStatus) -> &'static str {
    match status.violation {
        Violation::None => {
            if status.action == status.waypoint {
                "Agent followed the waypoint!"
            } else if status.action.is_idle() {
                if status.light == Light::Red {
                    "Agent idled at a red light!"
                } else {
                    "Agent idled at a green light with oncoming traffic."
                }
            } else {
                "Agent did not follow the waypoint."
            }
        }
        Violation::Minor => "There was a green light with no oncoming traffic.",
        Violation::Major => "There was a red light with no traffic.",
        Violation::MinorAccident => "There was traffic with right-of-way.",
        Violation::MajorAccident => "There was a red light with traffic.",
    }
}

fn arrow(heading: Heading) -> char {
    match (heading.dx, heading.dy) {
        (1, 0) => '>',
        (-1, 0) => '<',
        (0, -1) => '^',
        _ => 'v',
    }
}

/// Plain-text picture of the grid, one row per street.
///
/// Each intersection shows its light (`|` north-south green, `-` east-west
/// green) followed by the primary car's heading, `D` for the destination,
/// a dummy count or `.`.
pub fn draw_grid(scene: &Scene, color: bool) -> Vec<String> {
    let b = scene.bounds;
    let mut rows = Vec::with_capacity(b.height() as usize);
    for y in b.y_min..=b.y_max {
        let mut row = String::new();
        for x in b.x_min..=b.x_max {
            let loc = (x, y);
            let ns_open = scene
                .lights
                .iter()
                .find(|(l, _)| *l == loc)
                .map(|&(_, ns)| ns)
                .unwrap_or(false);
            let glyph = if ns_open { "|" } else { "-" };

            let primary = scene.cars.iter().find(|c| c.primary && c.location == loc);
            let dummies = scene
                .cars
                .iter()
                .filter(|c| !c.primary && c.location == loc)
                .count();
            let occupant = match primary {
                Some(car) => arrow(car.heading).to_string(),
                None if scene.destination == Some(loc) => "D".to_string(),
                None if dummies > 9 => "+".to_string(),
                None if dummies > 0 => dummies.to_string(),
                None => ".".to_string(),
            };

            if color {
                row.push_str(&format!(" {}", glyph.green()));
                if primary.is_some() {
                    row.push_str(&format!("{} ", occupant.yellow().bold()));
                } else if occupant == "D" {
                    row.push_str(&format!("{} ", occupant.red().bold()));
                } else {
                    row.push_str(&format!("{occupant} "));
                }
            } else {
                row.push_str(&format!(" {glyph}{occupant} "));
            }
        }
        rows.push(row);
    }
    rows
}

/// Full screen contents for one frame: grid, overlay, key help, then the
/// summary header and `history`.
///
/// The cursor is sent home and each line clears only its own tail, so
/// nothing the simulator prints is lost between frames.
pub fn compose_screen<'a>(
    frame: &Frame,
    history: impl IntoIterator<Item = &'a String>,
    color: bool,
) -> String {
    let mut lines = draw_grid(&frame.scene, color);
    lines.push(String::new());
    lines.extend(status_lines(frame));
    lines.push(String::new());
    lines.push("[Enter] pause  [q Enter] quit".to_string());
    lines.push(String::new());
    lines.extend(report::table_header().lines().map(str::to_string));
    lines.extend(history.into_iter().cloned());

    let mut text = String::from(HOME);
    for line in lines {
        text.push_str(&line);
        text.push_str(CLEAR_LINE);
        text.push('\n');
    }
    text.push_str(CLEAR_BELOW);
    text
}

/// ANSI terminal renderer.
pub struct TerminalDisplay {
    out: Stdout,
    keys: Receiver<String>,
    color: bool,
    history: VecDeque<String>,
}

impl TerminalDisplay {
    /// Fails with `DisplayUnavailable` when stdin/stdout are not a terminal.
    pub fn open(color: bool) -> Result<Self> {
        if !io::stdout().is_terminal() {
            return Err(SimError::DisplayUnavailable(
                "stdout is not a terminal".to_string(),
            ));
        }
        if !io::stdin().is_terminal() {
            return Err(SimError::DisplayUnavailable(
                "stdin is not a terminal".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("smartcab-keys".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        debug!("terminal display opened");
        Ok(Self {
            out: io::stdout(),
            keys: rx,
            color,
            history: VecDeque::with_capacity(HISTORY_LINES),
        })
    }
}

impl Display for TerminalDisplay {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        let text = compose_screen(frame, &self.history, self.color);
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<DisplayEvent> {
        let mut events = Vec::new();
        loop {
            match self.keys.try_recv() {
                Ok(line) => events.push(DisplayEvent::from_line(&line)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    fn show_paused(&mut self, paused: bool) -> Result<()> {
        let mut out = self.out.lock();
        if paused {
            let text = if self.color {
                PAUSE_TEXT.red().to_string()
            } else {
                PAUSE_TEXT.to_string()
            };
            writeln!(out, "{text}")?;
        } else {
            // Clear the pause line.
            write!(out, "\x1b[1A\x1b[2K")?;
        }
        out.flush()?;
        Ok(())
    }

    fn log_line(&mut self, line: &str) {
        push_history(&mut self.history, line);
    }

    fn shutdown(&mut self) {
        let mut out = self.out.lock();
        let _ = writeln!(out);
        let _ = out.flush();
    }
}

/// Append `line` (split on newlines), dropping the oldest beyond
/// `HISTORY_LINES`.
fn push_history(history: &mut VecDeque<String>, line: &str) {
    for part in line.lines() {
        if history.len() == HISTORY_LINES {
            history.pop_front();
        }
        history.push_back(part.to_string());
    }
}
