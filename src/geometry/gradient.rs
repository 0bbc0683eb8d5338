// Curvature-derived colour ramp along the circuit, used to hint where cars slow down

use std::f64::consts::PI;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use simple_moving_average::{SMA, SumTreeSMA};

use super::{LngLat, haversine_distance};

/// Points on each side of the centre of the smoothing window
const SMOOTHING_RADIUS: usize = 3;
const SMOOTHING_WINDOW: usize = 2 * SMOOTHING_RADIUS + 1;

/// First and last point closer than this are treated as one closed loop
const CLOSED_LOOP_TOLERANCE_M: f64 = 1.0;

const MIN_CURVATURE: f64 = 1e-12;

/// 8-bit colour, serialized as `#rrggbb`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn lerp(self, other: Rgb, frac: f64) -> Rgb {
        let frac = frac.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        Rgb::new(
            channel(self.r, other.r),
            channel(self.g, other.g),
            channel(self.b, other.b),
        )
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("expected a #rrggbb colour, got {value:?}"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|e| format!("{value:?}: {e}"))
        };
        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    /// Emit a stop every `stride` points
    pub stride: usize,
    /// Colour for straights
    pub fast: Rgb,
    /// Colour for the tightest corner
    pub slow: Rgb,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            stride: 4,
            fast: Rgb::new(0x00, 0xd2, 0xbe),
            slow: Rgb::new(0xe1, 0x06, 0x00),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    /// Arc-length progress of the stop, strictly increasing along the gradient
    pub offset: f64,
    /// Normalized smoothed curvature in [0, 1]
    pub intensity: f64,
    pub color: Rgb,
}

fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}

/// Heading of the segment a -> b on a local equirectangular plane
fn heading(a: LngLat, b: LngLat) -> Option<f64> {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let dx = (b.lng - a.lng) * mean_lat.cos();
    let dy = b.lat - a.lat;
    if dx == 0.0 && dy == 0.0 {
        None
    } else {
        Some(dy.atan2(dx))
    }
}

fn turn(prev: LngLat, at: LngLat, next: LngLat) -> f64 {
    match (heading(prev, at), heading(at, next)) {
        (Some(h_in), Some(h_out)) => wrap_angle(h_out - h_in).abs(),
        _ => 0.0,
    }
}

fn is_closed_loop(coords: &[LngLat]) -> bool {
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() >= 3 => {
            haversine_distance(*first, *last) < CLOSED_LOOP_TOLERANCE_M
        }
        _ => false,
    }
}

/// Absolute turning angle (radians) at every point.
///
/// Endpoints of an open line have no turn. On a closed loop the seam point
/// takes the turn between the last and the first segment.
pub fn turning_angles(coords: &[LngLat]) -> Vec<f64> {
    let n = coords.len();
    let mut angles = vec![0.0; n];
    for (i, (prev, at, next)) in coords.iter().tuple_windows().enumerate() {
        angles[i + 1] = turn(*prev, *at, *next);
    }
    if is_closed_loop(coords) {
        let seam = turn(coords[n - 2], coords[0], coords[1]);
        angles[0] = seam;
        angles[n - 1] = seam;
    }
    angles
}

/// Turning angles averaged over a symmetric window around each point.
///
/// Windows wrap around the seam on a closed loop and repeat the edge value on
/// an open line.
pub fn smoothed_curvature(coords: &[LngLat]) -> Vec<f64> {
    let angles = turning_angles(coords);
    let n = angles.len();
    if n == 0 {
        return angles;
    }
    // the last point of a closed loop repeats the first one
    let closed = is_closed_loop(coords);
    let period = (if closed { n - 1 } else { n }) as isize;
    let sample = |offset: isize| -> f64 {
        let idx = if closed {
            offset.rem_euclid(period) as usize
        } else {
            offset.clamp(0, n as isize - 1) as usize
        };
        angles[idx]
    };

    let radius = SMOOTHING_RADIUS as isize;
    let mut window = SumTreeSMA::<f64, f64, SMOOTHING_WINDOW>::new();
    for k in -radius..radius {
        window.add_sample(sample(k));
    }
    (0..n as isize)
        .map(|i| {
            window.add_sample(sample(i + radius));
            window.get_average()
        })
        .collect()
}

/// Curvature colour stops for a line-progress gradient.
///
/// Smoothed curvature is normalized against its maximum and mapped from the
/// `fast` to the `slow` colour. Only every `stride`-th point becomes a stop, the
/// final point always does, and stops with a non-increasing offset are dropped.
pub fn speed_gradient(
    coords: &[LngLat],
    cum_dist: &[f64],
    config: &GradientConfig,
) -> Vec<GradientStop> {
    let n = coords.len();
    if n == 0 || cum_dist.len() != n {
        return Vec::new();
    }

    let curvature = smoothed_curvature(coords);
    let max = curvature.iter().copied().fold(0.0, f64::max);
    let total = cum_dist[n - 1];

    let mut stops: Vec<GradientStop> = Vec::new();
    let indices = (0..n).step_by(config.stride.max(1)).chain(std::iter::once(n - 1));
    for i in indices {
        let offset = if total > 0.0 { cum_dist[i] / total } else { 0.0 };
        if stops.last().is_some_and(|last| offset <= last.offset) {
            continue;
        }
        let intensity = if max > MIN_CURVATURE {
            curvature[i] / max
        } else {
            0.0
        };
        stops.push(GradientStop {
            offset,
            intensity,
            color: config.fast.lerp(config.slow, intensity),
        });
    }
    stops
}
