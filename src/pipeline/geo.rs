use crate::types::fix::{Distance, Position, Speed};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine).
pub fn distance_horizontal(a: &Position, b: &Position) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Signed altitude change from `a` to `b`, positive on ascent.
pub fn distance_vertical(a: &Position, b: &Position) -> f64 {
    b.altitude - a.altitude
}

pub fn distance_total(horizontal: f64, vertical: f64) -> f64 {
    horizontal.hypot(vertical)
}

/// `distance / seconds`, or 0 when no time has passed.
pub fn speed(distance: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        distance / seconds
    } else {
        0.0
    }
}

impl Distance {
    pub fn between(a: &Position, b: &Position) -> Self {
        let horizontal = distance_horizontal(a, b);
        let vertical = distance_vertical(a, b);
        Self {
            horizontal,
            vertical,
            total: distance_total(horizontal, vertical),
        }
    }
}

impl Speed {
    pub fn over(distance: &Distance, seconds: f64) -> Self {
        Self {
            horizontal: speed(distance.horizontal, seconds),
            vertical: speed(distance.vertical, seconds),
            total: speed(distance.total, seconds),
        }
    }
}
