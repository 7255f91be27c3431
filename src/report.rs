// src/report.rs
//
// Text rendering of run results:
// - per-trial summary table (header + one row per completed trial)
// - Q-table dump for learning agents
// - per-step trace lines
//
// Colour is applied after padding so ANSI codes never skew column widths.

use colored::{ColoredString, Colorize};

use crate::agent::PrimaryAgent;
use crate::environment::StepStatus;
use crate::sim::TrialRecord;
use crate::types::{Light, Violation};

/// Width of one Q-table cell, excluding its two-space gutter.
const CELL: usize = 8;

/// Summary table header: column titles and a rule.
pub fn table_header() -> String {
    format!(
        "{:9} {:5}  {:>8}  {:10}  {:10}  {:9}  {:8}  {:>8}\n{}",
        "Type",
        "Trial",
        "Epsilon",
        "Avg Reward",
        "Violations",
        "Accidents",
        "Coverage",
        "Status",
        "-".repeat(80)
    )
}

enum Tone {
    Good,
    Bad,
    Plain,
}

fn paint(text: String, tone: Tone, color: bool) -> String {
    if !color {
        return text;
    }
    let s: ColoredString = match tone {
        Tone::Good => text.green(),
        Tone::Bad => text.red(),
        Tone::Plain => return text,
    };
    s.to_string()
}

/// Green when `value * sign` is positive, red when negative.
fn tone_of(value: f64, sign: f64) -> Tone {
    let v = value * sign;
    if v > 0.0 {
        Tone::Good
    } else if v < 0.0 {
        Tone::Bad
    } else {
        Tone::Plain
    }
}

/// One summary table row.
pub fn format_row(record: &TrialRecord, color: bool) -> String {
    let avg = record.avg_reward();
    let violations = record.actions().violations();
    let accidents = record.actions().accidents();

    let avg_cell = paint(format!("{:>10}", format!("{avg:.2}")), tone_of(avg, 1.0), color);
    let viol_cell = paint(
        format!("{violations:>10}"),
        tone_of(f64::from(violations), -1.0),
        color,
    );
    let acc_cell = paint(
        format!("{accidents:>9}"),
        tone_of(f64::from(accidents), -1.0),
        color,
    );
    let status_cell = if record.success() {
        paint(format!("{:>8}", "On time"), Tone::Good, color)
    } else {
        paint(format!("{:>8}", "Late"), Tone::Bad, color)
    };

    format!(
        "{:9} {:5}  {:8.2}  {}  {}  {}  {:8.3}  {}",
        record.phase().label(),
        record.trial(),
        record.epsilon(),
        avg_cell,
        viol_cell,
        acc_cell,
        record.coverage(),
        status_cell
    )
}

/// Q-table as text: title row, column header, rule, then one sorted row per
/// visited state. Zero values print as blank cells.
pub fn format_q_table(agent: &dyn PrimaryAgent) -> String {
    let names = agent.state_names();
    let actions = agent.valid_actions();
    let ns = names.len();
    let na = actions.len();

    let state_w = ns * (CELL + 2);
    let action_w = na * (CELL + 2);
    let first = format!(
        "{:^state_w$} | {:^action_w$}",
        "States", "Actions and Rewards"
    );

    let mut header = String::new();
    for name in names {
        header.push_str(&format!("{name:CELL$}  "));
    }
    header.push_str(" | ");
    for action in actions {
        header.push_str(&format!("{:>CELL$}  ", action.as_str()));
    }

    let rule = format!("{}-", "-".repeat((ns + na) * (CELL + 2)));

    let mut rows: Vec<String> = agent
        .q_rows()
        .into_iter()
        .map(|row| {
            let mut line = String::new();
            for value in &row.state {
                line.push_str(&format!("{value:CELL$}  "));
            }
            line.push_str(" | ");
            for &v in &row.values {
                if v == 0.0 {
                    line.push_str(&" ".repeat(CELL));
                } else {
                    line.push_str(&format!("{v:CELL$.2}"));
                }
                line.push_str("  ");
            }
            line
        })
        .collect();
    rows.sort();

    let mut lines = vec![first, header, rule];
    lines.extend(rows);
    lines.join("\n")
}

/// What happened on a tick, in words.
pub fn describe_step(status: &StepStatus) -> String {
    let action = status.action;
    match status.violation {
        Violation::None => {
            if action == status.waypoint {
                format!("Followed the waypoint {action}.")
            } else if action.is_idle() {
                if status.light == Light::Red {
                    "Properly idled at a red light.".to_string()
                } else {
                    "Idled at a green light with oncoming traffic.".to_string()
                }
            } else {
                format!("Drove {action} instead of {}.", status.waypoint)
            }
        }
        Violation::Minor => "Idled at a green light with no oncoming traffic.".to_string(),
        Violation::Major => format!("Attempted driving {action} through a red light."),
        Violation::MinorAccident => {
            format!("Attempted driving {action} through traffic and caused a minor accident.")
        }
        Violation::MajorAccident => format!(
            "Attempted driving {action} through a red light with traffic and caused a major accident."
        ),
    }
}

/// One trace line: tick, SUCCESS/FAIL, reward and description.
pub fn trace_line(status: &StepStatus, color: bool) -> String {
    let ok = if status.reward >= 0.0 {
        paint("SUCCESS".to_string(), Tone::Good, color)
    } else {
        paint("FAIL   ".to_string(), Tone::Bad, color)
    };
    format!(
        "{:4} {} {:10.2} {}",
        status.t,
        ok,
        status.reward,
        describe_step(status)
    )
}

/// Lines printed before a traced trial starts.
pub fn trial_banner(agent: &dyn PrimaryAgent) -> String {
    if agent.is_learning() {
        format!(
            "Simulating trial...\nepsilon = {:.4}; alpha = {:.4}",
            agent.epsilon(),
            agent.alpha()
        )
    } else {
        "Simulating trial...\nAgent not set to learn.".to_string()
    }
}
