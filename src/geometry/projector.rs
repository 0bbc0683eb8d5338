// Arc-length parameterization of a circuit polyline

use std::hash::{DefaultHasher, Hash, Hasher};

use itertools::Itertools;
use log::debug;

use super::{LngLat, clamp_fraction};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Spans narrower than this (as a lap fraction) are treated as empty
const MIN_WRAP_SPAN: f64 = 1e-9;

/// Great-circle distance between two coordinates in metres
pub fn haversine_distance(a: LngLat, b: LngLat) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Running sum of segment lengths, one entry per coordinate starting at 0
pub fn build_cumulative_distances(coords: &[LngLat]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(coords.len());
    if coords.is_empty() {
        return cumulative;
    }
    cumulative.push(0.0);
    let mut total = 0.0;
    for (a, b) in coords.iter().tuple_windows() {
        total += haversine_distance(*a, *b);
        cumulative.push(total);
    }
    cumulative
}

/// Project a lap progress fraction onto the polyline.
///
/// `t` is clamped to [0, 1]. A polyline with a single point, or with zero total
/// length, yields its first point for every `t`. Only an empty polyline yields `None`.
pub fn interpolate(coords: &[LngLat], cum_dist: &[f64], t: f64) -> Option<LngLat> {
    let first = *coords.first()?;
    let total = cum_dist.last().copied().unwrap_or(0.0);
    if coords.len() < 2 || cum_dist.len() != coords.len() || total <= 0.0 {
        return Some(first);
    }

    let target = clamp_fraction(t) * total;
    let idx = cum_dist.partition_point(|d| *d < target);
    if idx == 0 {
        return Some(first);
    }
    if idx >= coords.len() {
        return coords.last().copied();
    }

    let (d0, d1) = (cum_dist[idx - 1], cum_dist[idx]);
    let segment = d1 - d0;
    if segment <= 0.0 {
        return Some(coords[idx]);
    }
    let frac = ((target - d0) / segment).clamp(0.0, 1.0);
    Some(coords[idx - 1].lerp(coords[idx], frac))
}

/// Progress fractions sampled between `start_t` and `end_t`.
///
/// A forward span yields `samples + 1` evenly spaced values. When `start_t > end_t`
/// the span crosses the start/finish seam: the samples are split between the arc
/// before the seam and the arc after it in proportion to `1 - start_t` and `end_t`,
/// the seam itself (progress 1.0) appears exactly once, and each arc keeps at
/// least one step. The split is proportional only, so a zone covering nearly the
/// whole lap can leave one arc with a single step.
pub fn sub_line_progress(start_t: f64, end_t: f64, samples: usize) -> Vec<f64> {
    let start = clamp_fraction(start_t);
    let end = clamp_fraction(end_t);
    let samples = samples.max(1);

    if start <= end {
        return (0..=samples)
            .map(|i| start + (end - start) * i as f64 / samples as f64)
            .collect();
    }

    let before_seam = 1.0 - start;
    let after_seam = end;
    let span = before_seam + after_seam;
    if span < MIN_WRAP_SPAN {
        debug!("Wrap-around span {span} is too narrow to sample, returning endpoints");
        return vec![start, end];
    }

    let samples = samples.max(2);
    let head = ((samples as f64 * before_seam / span).round() as usize).clamp(1, samples - 1);
    let tail = samples - head;

    let mut progress = Vec::with_capacity(samples + 1);
    progress.extend((0..=head).map(|i| {
        if i == head {
            1.0
        } else {
            start + before_seam * i as f64 / head as f64
        }
    }));
    progress.extend((1..=tail).map(|i| after_seam * i as f64 / tail as f64));
    progress
}

/// Sample the sub-polyline between two progress fractions, wrapping across the seam
/// when `start_t > end_t`
pub fn extract_sub_line(
    coords: &[LngLat],
    cum_dist: &[f64],
    start_t: f64,
    end_t: f64,
    samples: usize,
) -> Vec<LngLat> {
    sub_line_progress(start_t, end_t, samples)
        .into_iter()
        .filter_map(|t| interpolate(coords, cum_dist, t))
        .collect()
}

fn sector_cut_indices(len: usize) -> (usize, usize) {
    (len / 3, 2 * len / 3)
}

/// Partition the polyline into three contiguous groups by point count.
///
/// Neighbouring groups share their boundary point. Sectors are equal in point
/// count, not in arc length; the sector legend relies on this exact definition.
pub fn split_into_sectors(coords: &[LngLat]) -> [Vec<LngLat>; 3] {
    if coords.is_empty() {
        return Default::default();
    }
    let (first_cut, second_cut) = sector_cut_indices(coords.len());
    [
        coords[..=first_cut].to_vec(),
        coords[first_cut..=second_cut].to_vec(),
        coords[second_cut..].to_vec(),
    ]
}

/// Lap progress at the two shared sector boundary points
pub fn sector_boundaries(coords: &[LngLat], cum_dist: &[f64]) -> [f64; 2] {
    let total = cum_dist.last().copied().unwrap_or(0.0);
    if coords.is_empty() || cum_dist.len() != coords.len() || total <= 0.0 {
        return [0.0, 0.0];
    }
    let (first_cut, second_cut) = sector_cut_indices(coords.len());
    [cum_dist[first_cut] / total, cum_dist[second_cut] / total]
}

/// A circuit centreline with its arc-length table
#[derive(Clone, Debug, PartialEq)]
pub struct TrackPolyline {
    coords: Vec<LngLat>,
    cumulative: Vec<f64>,
}

impl TrackPolyline {
    pub fn new(coords: Vec<LngLat>) -> Self {
        let cumulative = build_cumulative_distances(&coords);
        Self { coords, cumulative }
    }

    pub fn coords(&self) -> &[LngLat] {
        &self.coords
    }

    pub fn cumulative_distances(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn total_length_m(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Fewer than two points or no length: every progress maps to the same point
    pub fn is_degenerate(&self) -> bool {
        self.coords.len() < 2 || self.total_length_m() <= 0.0
    }

    /// Lap progress of the point at `index`
    pub fn progress_at(&self, index: usize) -> f64 {
        let total = self.total_length_m();
        match self.cumulative.get(index) {
            Some(d) if total > 0.0 => d / total,
            _ => 0.0,
        }
    }

    pub fn interpolate(&self, t: f64) -> Option<LngLat> {
        interpolate(&self.coords, &self.cumulative, t)
    }

    pub fn extract_sub_line(&self, start_t: f64, end_t: f64, samples: usize) -> Vec<LngLat> {
        extract_sub_line(&self.coords, &self.cumulative, start_t, end_t, samples)
    }

    pub fn sectors(&self) -> [Vec<LngLat>; 3] {
        split_into_sectors(&self.coords)
    }

    pub fn sector_boundaries(&self) -> [f64; 2] {
        sector_boundaries(&self.coords, &self.cumulative)
    }

    /// Content hash of the coordinates, used to notice a geometry swap
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.coords.len().hash(&mut hasher);
        for c in &self.coords {
            c.lng.to_bits().hash(&mut hasher);
            c.lat.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    /// Closed loop of `n` points on a small circle, last point repeats the first
    fn circular_loop(n: usize) -> Vec<LngLat> {
        (0..n)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64;
                LngLat::new(7.4 + 0.01 * angle.cos(), 43.7 + 0.01 * angle.sin())
            })
            .collect()
    }

    fn progress_of(polyline: &TrackPolyline, point: LngLat) -> f64 {
        // the nearest sampled point on a dense resampling is close enough for assertions
        (0..=10_000)
            .map(|i| i as f64 / 10_000.0)
            .min_by(|a, b| {
                let da = haversine_distance(polyline.interpolate(*a).unwrap(), point);
                let db = haversine_distance(polyline.interpolate(*b).unwrap(), point);
                da.partial_cmp(&db).unwrap()
            })
            .unwrap()
    }

    #[test]
    fn test_haversine_one_degree() {
        let dist = haversine_distance(LngLat::new(0.0, 0.0), LngLat::new(0.0, 1.0));
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_three_point_polyline_end_to_end() {
        let coords = vec![
            LngLat::new(0.0, 0.0),
            LngLat::new(0.0, 1.0),
            LngLat::new(1.0, 1.0),
        ];
        let cum = build_cumulative_distances(&coords);
        let d1 = haversine_distance(coords[0], coords[1]);
        let d2 = haversine_distance(coords[1], coords[2]);
        assert_eq!(cum.len(), 3);
        assert_eq!(cum[0], 0.0);
        assert!((cum[1] - d1).abs() < EPS);
        assert!((cum[2] - (d1 + d2)).abs() < EPS);

        // half the total length falls inside the first, slightly longer segment
        let half = (d1 + d2) / 2.0;
        assert!(half < d1);
        let mid = interpolate(&coords, &cum, 0.5).unwrap();
        assert!(mid.lng.abs() < EPS);
        assert!((mid.lat - half / d1).abs() < EPS);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let polyline = TrackPolyline::new(circular_loop(100));
        let first = polyline.coords()[0];
        let last = polyline.coords()[99];
        let start = polyline.interpolate(0.0).unwrap();
        let end = polyline.interpolate(1.0).unwrap();
        assert!((start.lng - first.lng).abs() < EPS && (start.lat - first.lat).abs() < EPS);
        assert!((end.lng - last.lng).abs() < EPS && (end.lat - last.lat).abs() < EPS);
    }

    #[test]
    fn test_interpolate_clamps_out_of_range() {
        let polyline = TrackPolyline::new(circular_loop(20));
        assert_eq!(polyline.interpolate(-0.5), polyline.interpolate(0.0));
        assert_eq!(polyline.interpolate(1.5), polyline.interpolate(1.0));
        assert_eq!(polyline.interpolate(f64::NAN), polyline.interpolate(0.0));
    }

    #[test]
    fn test_degenerate_polylines() {
        assert_eq!(interpolate(&[], &[], 0.3), None);

        let single = vec![LngLat::new(1.0, 2.0)];
        let cum = build_cumulative_distances(&single);
        for t in [0.0, 0.4, 1.0] {
            assert_eq!(interpolate(&single, &cum, t), Some(single[0]));
        }

        // two identical points: zero total length
        let stacked = TrackPolyline::new(vec![LngLat::new(1.0, 2.0), LngLat::new(1.0, 2.0)]);
        assert!(stacked.is_degenerate());
        assert_eq!(stacked.interpolate(0.7), Some(LngLat::new(1.0, 2.0)));
        assert_eq!(stacked.sector_boundaries(), [0.0, 0.0]);
    }

    #[test]
    fn test_cumulative_distance_flat_across_duplicates() {
        let coords = vec![
            LngLat::new(0.0, 0.0),
            LngLat::new(0.0, 0.001),
            LngLat::new(0.0, 0.001),
            LngLat::new(0.0, 0.002),
        ];
        let cum = build_cumulative_distances(&coords);
        assert!(cum[1] > cum[0]);
        assert_eq!(cum[2], cum[1]);
        assert!(cum[3] > cum[2]);
        // projection across the duplicate stays continuous
        let p = interpolate(&coords, &cum, 0.5).unwrap();
        assert!((p.lat - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_forward_sub_line_is_gapless() {
        let polyline = TrackPolyline::new(circular_loop(100));
        let progress = sub_line_progress(0.2, 0.8, 20);
        assert_eq!(progress.len(), 21);
        assert!((progress[0] - 0.2).abs() < EPS);
        assert!((progress[20] - 0.8).abs() < EPS);
        for (a, b) in progress.iter().tuple_windows() {
            assert!(b > a);
            assert!((b - a - 0.03).abs() < 1e-9);
        }

        let line = polyline.extract_sub_line(0.2, 0.8, 20);
        assert_eq!(line.len(), 21);
        // consecutive samples are evenly spaced along the track, no gaps
        let step = polyline.total_length_m() * 0.03;
        for (a, b) in line.iter().tuple_windows() {
            assert!(haversine_distance(*a, *b) <= step * 1.01);
        }
    }

    #[test]
    fn test_wrap_around_sub_line_crosses_seam_once() {
        let polyline = TrackPolyline::new(circular_loop(100));
        let progress = sub_line_progress(0.9, 0.1, 20);
        assert_eq!(progress.len(), 21);
        assert!((progress[0] - 0.9).abs() < EPS);
        assert!((progress[20] - 0.1).abs() < EPS);
        assert_eq!(progress.iter().filter(|t| **t == 1.0).count(), 1);
        assert!(progress.iter().all(|t| *t != 0.0));

        let line = polyline.extract_sub_line(0.9, 0.1, 20);
        let seam = polyline.coords()[0];
        let seam_points = line
            .iter()
            .filter(|p| haversine_distance(**p, seam) < 1e-6)
            .count();
        assert_eq!(seam_points, 1);
        assert!((progress_of(&polyline, line[0]) - 0.9).abs() < 1e-3);
        assert!((progress_of(&polyline, line[20]) - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_wrap_around_near_zero_span_returns_endpoints() {
        let progress = sub_line_progress(1.0, 0.0, 20);
        assert_eq!(progress, vec![1.0, 0.0]);

        let polyline = TrackPolyline::new(circular_loop(50));
        assert_eq!(polyline.extract_sub_line(1.0, 0.0, 20).len(), 2);
    }

    #[test]
    fn test_wrap_around_tiny_arc_keeps_a_step() {
        // almost all of the zone is after the seam
        let progress = sub_line_progress(0.999_999, 0.9, 10);
        assert_eq!(progress.len(), 11);
        assert!((progress[0] - 0.999_999).abs() < EPS);
        assert_eq!(progress[1], 1.0);
        assert!((progress[10] - 0.9).abs() < EPS);
    }

    #[test]
    fn test_split_into_sectors_by_point_count() {
        let coords = circular_loop(100);
        let [s1, s2, s3] = split_into_sectors(&coords);
        assert_eq!(s1.len(), 34);
        assert_eq!(s2.len(), 34);
        assert_eq!(s3.len(), 34);
        assert_eq!(s1.last(), s2.first());
        assert_eq!(s2.last(), s3.first());
        assert_eq!(s1.first(), coords.first());
        assert_eq!(s3.last(), coords.last());

        let [a, b, c] = split_into_sectors(&coords[..1]);
        assert_eq!((a.len(), b.len(), c.len()), (1, 1, 1));
        assert!(split_into_sectors(&[]).iter().all(Vec::is_empty));
    }

    #[test]
    fn test_sector_boundaries_follow_point_cuts() {
        let polyline = TrackPolyline::new(circular_loop(100));
        let [b1, b2] = polyline.sector_boundaries();
        assert!((b1 - polyline.progress_at(33)).abs() < EPS);
        assert!((b2 - polyline.progress_at(66)).abs() < EPS);
    }

    #[test]
    fn test_fingerprint_tracks_geometry() {
        let a = TrackPolyline::new(circular_loop(30));
        let b = TrackPolyline::new(circular_loop(30));
        let c = TrackPolyline::new(circular_loop(31));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    fn arb_polyline() -> impl Strategy<Value = Vec<LngLat>> {
        prop::collection::vec((-10.0f64..10.0, -60.0f64..60.0), 2..60)
            .prop_map(|pts| pts.into_iter().map(|(lng, lat)| LngLat::new(lng, lat)).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_interpolation_stays_in_bounding_box(coords in arb_polyline(), t in 0.0f64..=1.0) {
            let cum = build_cumulative_distances(&coords);
            let p = interpolate(&coords, &cum, t).unwrap();
            let min_lng = coords.iter().map(|c| c.lng).fold(f64::INFINITY, f64::min);
            let max_lng = coords.iter().map(|c| c.lng).fold(f64::NEG_INFINITY, f64::max);
            let min_lat = coords.iter().map(|c| c.lat).fold(f64::INFINITY, f64::min);
            let max_lat = coords.iter().map(|c| c.lat).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(p.lng >= min_lng - EPS && p.lng <= max_lng + EPS);
            prop_assert!(p.lat >= min_lat - EPS && p.lat <= max_lat + EPS);
        }

        #[test]
        fn prop_cumulative_distances_non_decreasing(coords in arb_polyline()) {
            let cum = build_cumulative_distances(&coords);
            prop_assert_eq!(cum.len(), coords.len());
            for (a, b) in cum.iter().tuple_windows() {
                prop_assert!(b >= a);
            }
        }

        #[test]
        fn prop_sub_line_has_requested_sample_count(
            start in 0.0f64..=1.0,
            end in 0.0f64..=1.0,
            samples in 2usize..64,
        ) {
            let progress = sub_line_progress(start, end, samples);
            let narrow_wrap = start > end && (1.0 - start + end) < MIN_WRAP_SPAN;
            if narrow_wrap {
                prop_assert_eq!(progress.len(), 2);
            } else {
                prop_assert_eq!(progress.len(), samples + 1);
            }
            prop_assert!(progress.iter().all(|t| (0.0..=1.0).contains(t)));
        }
    }
}
