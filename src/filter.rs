//! Overlap filter: drop paths already covered by previously drawn ink
//!
//! A pen of width `w` inks the Minkowski sum of its polyline with a disk
//! of radius `w/2`. A candidate path whose footprint is almost entirely
//! inside ink laid down by earlier (longer) paths draws nothing visible
//! and is removed before ordering.
//!
//! # Algorithm
//!
//! 1. Process paths in descending draw-length order (ties by ascending
//!    input index). Longer strokes lay down ink first, which keeps later
//!    redundancy decisions stable.
//! 2. Keep the accepted ink as an R-tree of path segments. The coverage
//!    query "is any accepted segment within w/2 of this point" is a
//!    `locate_within_distance` probe with radius²  = (w/2)².
//! 3. Sample each candidate along its polyline at min(w/4, 0.5) mm and
//!    count covered samples. A path is redundant when the covered
//!    fraction reaches 1 - visibility_threshold/100; otherwise its
//!    segments join the ink set.
//!
//! The filter never fails: malformed input is rejected at ingress, before
//! this stage runs.

use rstar::primitives::{GeomWithData, Line};
use rstar::RTree;

use crate::config::PlotConfig;
use crate::path::{dist, Point, Polyline};

/// Largest sampling step along a candidate polyline, in mm
const MAX_SAMPLE_STEP: f64 = 0.5;

/// Partition of the input indices into surviving and removed paths, both
/// in ascending original order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept_indices: Vec<usize>,
    pub removed_indices: Vec<usize>,
}

impl FilterOutcome {
    /// Outcome of a disabled filter: every path survives
    fn keep_all(count: usize) -> Self {
        Self {
            kept_indices: (0..count).collect(),
            removed_indices: Vec::new(),
        }
    }
}

/// Accepted segments with the owning path index, for `w/2` range probes
type InkSegment = GeomWithData<Line<[f64; 2]>, usize>;

struct InkIndex {
    tree: RTree<InkSegment>,
    radius_sq: f64,
}

impl InkIndex {
    fn new(pen_width: f64) -> Self {
        let radius = pen_width / 2.0;
        Self {
            tree: RTree::new(),
            radius_sq: radius * radius,
        }
    }

    /// Is `point` within the ink footprint of any accepted segment?
    fn covered(&self, point: Point) -> bool {
        self.tree
            .locate_within_distance([point.x, point.y], self.radius_sq)
            .next()
            .is_some()
    }

    fn insert_path(&mut self, index: usize, path: &Polyline) {
        for w in path.points().windows(2) {
            self.tree.insert(GeomWithData::new(
                Line::new([w[0].x, w[0].y], [w[1].x, w[1].y]),
                index,
            ));
        }
    }
}

/// Sample a polyline at `step` mm of arc length, endpoints included
fn sample_polyline(path: &Polyline, step: f64) -> Vec<Point> {
    let mut samples = vec![path.start()];
    // Arc-length distance from the current segment's start to the next
    // sample position.
    let mut to_next = step;

    for w in path.points().windows(2) {
        let seg_len = dist(w[0], w[1]);
        let mut t = to_next;
        while t <= seg_len && seg_len > 0.0 {
            let frac = t / seg_len;
            samples.push(Point::new(
                w[0].x + (w[1].x - w[0].x) * frac,
                w[0].y + (w[1].y - w[0].y) * frac,
            ));
            t += step;
        }
        to_next = t - seg_len;
    }

    let end = path.end();
    if dist(*samples.last().expect("at least the start sample"), end) > 1e-9 {
        samples.push(end);
    }
    samples
}

/// Partition `paths` into kept and removed sets.
///
/// With `pen_width == 0` or `visibility_threshold >= 100` the geometric
/// work is skipped and every path is kept.
pub fn filter_paths(paths: &[Polyline], config: &PlotConfig) -> FilterOutcome {
    let n = paths.len();
    if !config.filter_enabled() {
        return FilterOutcome::keep_all(n);
    }

    let draw_lengths: Vec<f64> = paths.iter().map(|p| p.draw_length()).collect();

    // Descending draw length, ascending input index on ties. Lengths are
    // finite here (ingress validation), so the comparison never sees NaN.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        draw_lengths[b]
            .partial_cmp(&draw_lengths[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let step = (config.pen_width / 4.0).min(MAX_SAMPLE_STEP);
    let redundant_at = 1.0 - config.visibility_threshold / 100.0;

    let mut ink = InkIndex::new(config.pen_width);
    let mut removed = vec![false; n];

    for &idx in &order {
        let path = &paths[idx];

        // Sub-tolerance paths degrade to a point: one sample decides.
        let samples = if draw_lengths[idx] < config.merge_threshold {
            vec![path.start()]
        } else {
            sample_polyline(path, step)
        };

        let covered = samples.iter().filter(|&&p| ink.covered(p)).count();
        let covered_fraction = covered as f64 / samples.len() as f64;

        if covered_fraction >= redundant_at {
            removed[idx] = true;
        } else {
            ink.insert_path(idx, path);
        }
    }

    let mut outcome = FilterOutcome {
        kept_indices: Vec::with_capacity(n),
        removed_indices: Vec::new(),
    };
    for (idx, is_removed) in removed.iter().enumerate() {
        if *is_removed {
            outcome.removed_indices.push(idx);
        } else {
            outcome.kept_indices.push(idx);
        }
    }

    tracing::debug!(
        original = n,
        kept = outcome.kept_indices.len(),
        removed = outcome.removed_indices.len(),
        "overlap filter done"
    );
    outcome
}
