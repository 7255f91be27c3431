// src/planner.rs
//
// Route planner: next waypoint toward the destination on the wrap-around grid.

use crate::types::{Action, Heading, Location};

/// Inclusive intersection bounds `(x_min, y_min, x_max, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Bounds {
    /// Bounds for a `w x h` grid whose intersections start at (1, 1).
    pub fn for_grid(w: i32, h: i32) -> Self {
        Self {
            x_min: 1,
            y_min: 1,
            x_max: w,
            y_max: h,
        }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min + 1
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min + 1
    }

    pub fn contains(&self, loc: Location) -> bool {
        (self.x_min..=self.x_max).contains(&loc.0) && (self.y_min..=self.y_max).contains(&loc.1)
    }

    /// Move one block along `heading`, wrapping around the edges.
    pub fn advance(&self, loc: Location, heading: Heading) -> Location {
        (
            (loc.0 + heading.dx - self.x_min).rem_euclid(self.width()) + self.x_min,
            (loc.1 + heading.dy - self.y_min).rem_euclid(self.height()) + self.y_min,
        )
    }

    /// Signed shortest displacement from `from` to `to`, allowing wrap-around.
    ///
    /// When both ways round are equally long (half of an even span), the
    /// sign follows `heading` on that axis, and is positive if the heading
    /// is perpendicular.
    pub fn displacement(&self, from: Location, to: Location, heading: Heading) -> (i32, i32) {
        (
            shortest(to.0 - from.0, self.width(), heading.dx),
            shortest(to.1 - from.1, self.height(), heading.dy),
        )
    }
}

fn shortest(d: i32, span: i32, toward: i32) -> i32 {
    let d = d.rem_euclid(span);
    if span % 2 == 0 && d == span / 2 && toward < 0 {
        -d
    } else if d > span / 2 {
        d - span
    } else {
        d
    }
}

/// Manhattan distance without wrap-around; used for deadlines.
pub fn manhattan(a: Location, b: Location) -> i32 {
    (a.0 - b.0).abs() + (a.1 - b.1).abs()
}

/// Stateless route planner.
#[derive(Debug, Clone, Copy)]
pub struct RoutePlanner {
    bounds: Bounds,
}

impl RoutePlanner {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Turn that moves toward `destination`; `Idle` once it is reached.
    ///
    /// The horizontal axis is resolved first. When the destination lies
    /// straight behind, the planner turns toward the other axis if it still
    /// has distance to cover, otherwise it turns right.
    pub fn next_waypoint(&self, location: Location, heading: Heading, destination: Location) -> Action {
        let (dx, dy) = self.bounds.displacement(location, destination, heading);
        if dx == 0 && dy == 0 {
            return Action::Idle;
        }

        let mut wanted = Vec::with_capacity(2);
        if dx != 0 {
            wanted.push(Heading {
                dx: dx.signum(),
                dy: 0,
            });
        }
        if dy != 0 {
            wanted.push(Heading {
                dx: 0,
                dy: dy.signum(),
            });
        }

        if wanted.contains(&heading) {
            return Action::Forward;
        }
        for target in &wanted {
            if heading.left() == *target {
                return Action::Left;
            }
            if heading.right() == *target {
                return Action::Right;
            }
        }
        Action::Right
    }
}
