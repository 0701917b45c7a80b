//! Park geometry and minute-granular time helpers shared by every other module.

use serde::{Deserialize, Serialize};

/// A point in the park, in distance units (not necessarily meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Moves this point at most `max_step` distance units towards `target`,
    /// returning the new position. Overshoot is clamped to `target`.
    pub fn step_towards(&self, target: Point, max_step: f64) -> Point {
        let dist = self.distance_to(target);
        if dist <= max_step || dist == 0.0 {
            return target;
        }
        let t = max_step / dist;
        Point::new(self.x + (target.x - self.x) * t, self.y + (target.y - self.y) * t)
    }

    pub fn clamp_to(&self, width: f64, height: f64) -> Point {
        Point::new(self.x.clamp(0.0, width), self.y.clamp(0.0, height))
    }
}

/// A closed rectangular park `[0, width] x [0, height]` with a fixed set of
/// charging stations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Park {
    pub width: f64,
    pub height: f64,
    pub stations: Vec<Point>,
}

impl Park {
    /// The canonical five-station layout: four near the corners and one
    /// central, scaled proportionally to the park's dimensions.
    pub fn with_default_stations(width: f64, height: f64) -> Self {
        let stations = vec![
            Point::new(width * 0.05, height * 0.05),
            Point::new(width * 0.9, height * 0.1),
            Point::new(width * 0.1, height * 0.9),
            Point::new(width * 0.9, height * 0.9),
            Point::new(width * 0.5, height * 0.5),
        ];
        Self { width, height, stations }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }

    pub fn clamp(&self, p: Point) -> Point {
        p.clamp_to(self.width, self.height)
    }

    /// The nearest station to a point, by Euclidean distance.
    pub fn nearest_station(&self, p: Point) -> Point {
        *self
            .stations
            .iter()
            .min_by(|a, b| {
                a.distance_to(p)
                    .partial_cmp(&b.distance_to(p))
                    .expect("distances are finite")
            })
            .expect("park always has at least one station")
    }

    /// Whether `p` coincides with one of the park's stations (within floating
    /// point noise), used by the per-tick updater to tell "at a station" apart
    /// from "still travelling".
    pub fn is_at_station(&self, p: Point) -> bool {
        self.stations.iter().any(|s| s.distance_to(p) < 1e-6)
    }

    /// Which of the four equal-area quadrants a point falls in, used by the
    /// hybrid policy's area-balance term.
    pub fn quadrant(&self, p: Point) -> Zone {
        match (p.x >= self.width / 2.0, p.y >= self.height / 2.0) {
            (false, false) => Zone::SouthWest,
            (true, false) => Zone::SouthEast,
            (false, true) => Zone::NorthWest,
            (true, true) => Zone::NorthEast,
        }
    }
}

/// One of the four equal-area quadrants used by the hybrid policy's area-balance term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Zone {
    pub const ALL: [Zone; 4] = [Zone::NorthWest, Zone::NorthEast, Zone::SouthWest, Zone::SouthEast];
}

/// Hour-of-day derived from a minute-granular simulation clock.
pub fn hour_of_day(minute: u32) -> u32 {
    (minute / 60) % 24
}
