// src/types.rs
//
// Small value types shared by the environment, agent, planner and reports.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Grid coordinate of an intersection (x grows east, y grows south).
pub type Location = (i32, i32);

/// One of the four actions a car may take at an intersection.
///
/// `Idle` is the "None" action: stay put for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Idle,
    Forward,
    Left,
    Right,
}

impl Action {
    /// All actions in table order.
    pub const ALL: [Action; 4] = [Action::Idle, Action::Forward, Action::Left, Action::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Idle => "None",
            Action::Forward => "forward",
            Action::Left => "left",
            Action::Right => "right",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Action::Idle)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unit heading vector in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Heading {
    pub dx: i32,
    pub dy: i32,
}

impl Heading {
    pub const EAST: Heading = Heading { dx: 1, dy: 0 };
    pub const NORTH: Heading = Heading { dx: 0, dy: -1 };
    pub const WEST: Heading = Heading { dx: -1, dy: 0 };
    pub const SOUTH: Heading = Heading { dx: 0, dy: 1 };

    pub const ALL: [Heading; 4] = [Heading::EAST, Heading::NORTH, Heading::WEST, Heading::SOUTH];

    pub fn left(self) -> Heading {
        Heading {
            dx: self.dy,
            dy: -self.dx,
        }
    }

    pub fn right(self) -> Heading {
        Heading {
            dx: -self.dy,
            dy: self.dx,
        }
    }

    pub fn reverse(self) -> Heading {
        Heading {
            dx: -self.dx,
            dy: -self.dy,
        }
    }

    pub fn is_vertical(self) -> bool {
        self.dy != 0
    }

    /// Heading after successfully performing `action`.
    pub fn after(self, action: Action) -> Heading {
        match action {
            Action::Left => self.left(),
            Action::Right => self.right(),
            Action::Forward | Action::Idle => self,
        }
    }
}

/// Traffic light colour as seen by a car approaching an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Light {
    Red,
    Green,
}

impl Light {
    pub fn as_str(&self) -> &'static str {
        match self {
            Light::Red => "red",
            Light::Green => "green",
        }
    }
}

impl fmt::Display for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Rule infraction severity for a single step.
///
/// The numeric code (0..=4) is what the trial log buckets actions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    None,
    Minor,
    Major,
    MinorAccident,
    MajorAccident,
}

impl Violation {
    pub fn code(&self) -> usize {
        match self {
            Violation::None => 0,
            Violation::Minor => 1,
            Violation::Major => 2,
            Violation::MinorAccident => 3,
            Violation::MajorAccident => 4,
        }
    }

    /// Fixed reward for an illegal move. Legal moves are scored separately.
    pub fn penalty(&self) -> f64 {
        match self {
            Violation::None => 0.0,
            Violation::Minor => -5.0,
            Violation::Major => -10.0,
            Violation::MinorAccident => -20.0,
            Violation::MajorAccident => -40.0,
        }
    }
}

/// What the primary agent senses at its current intersection.
///
/// `oncoming`, `left` and `right` hold the intended action of the car
/// approaching from that side, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inputs {
    pub light: Light,
    pub oncoming: Option<Action>,
    pub left: Option<Action>,
    pub right: Option<Action>,
}

impl Inputs {
    pub fn clear(light: Light) -> Self {
        Self {
            light,
            oncoming: None,
            left: None,
            right: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_compose() {
        for h in Heading::ALL {
            assert_eq!(h.left().right(), h);
            assert_eq!(h.left().left(), h.reverse());
            assert_eq!(h.right().right().right().right(), h);
        }
        assert_eq!(Heading::EAST.left(), Heading::NORTH);
        assert_eq!(Heading::EAST.right(), Heading::SOUTH);
    }

    #[test]
    fn violation_codes_are_dense() {
        let codes: Vec<usize> = [
            Violation::None,
            Violation::Minor,
            Violation::Major,
            Violation::MinorAccident,
            Violation::MajorAccident,
        ]
        .iter()
        .map(Violation::code)
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }
}
