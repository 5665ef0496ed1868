//! Geometry model for plotter toolpaths
//!
//! A job's geometry is a list of [`Polyline`]s in machine coordinates
//! (millimetres). Polylines are immutable after ingest; everything the
//! optimizer produces is expressed as an ordering over their indices plus a
//! per-position direction flip, so callers can re-emit the original
//! geometry (and any per-path metadata) untouched.

use serde::{Deserialize, Serialize};

/// A 2-D point in machine coordinates (millimetres)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The tool head's home position; pen-up travel is measured from here
pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Euclidean distance between two points
pub fn dist(a: Point, b: Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// An ordered polyline the plotter draws with the pen down.
///
/// Valid polylines have at least two finite points; `optimize()` rejects
/// anything else before any stage runs, so downstream code may rely on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Build from raw `[x, y]` pairs (the CLI ingest shape)
    pub fn from_pairs(pairs: &[[f64; 2]]) -> Self {
        Self {
            points: pairs.iter().map(|p| Point::new(p[0], p[1])).collect(),
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First point of the polyline in its stored direction
    pub fn start(&self) -> Point {
        self.points[0]
    }

    /// Last point of the polyline in its stored direction
    pub fn end(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Total pen-down length: sum of segment lengths along the polyline
    pub fn draw_length(&self) -> f64 {
        self.points.windows(2).map(|w| dist(w[0], w[1])).sum()
    }
}

/// One position in an optimized sequence: which original path is drawn
/// there, and whether it is drawn end-to-start.
///
/// This is the downstream contract: the final ordering is handed back as
/// `(index, flipped)` pairs so the caller can re-emit original geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    /// Index into the original input path list
    pub index: usize,
    /// Draw from `end` to `start` instead of `start` to `end`
    pub flipped: bool,
}

impl SequenceEntry {
    pub fn new(index: usize, flipped: bool) -> Self {
        Self { index, flipped }
    }

    /// Where the pen touches down for this entry
    pub fn effective_start(&self, paths: &[Polyline]) -> Point {
        if self.flipped {
            paths[self.index].end()
        } else {
            paths[self.index].start()
        }
    }

    /// Where the pen lifts after this entry
    pub fn effective_end(&self, paths: &[Polyline]) -> Point {
        if self.flipped {
            paths[self.index].start()
        } else {
            paths[self.index].end()
        }
    }

    /// The point sequence actually drawn: original geometry, reversed when
    /// the flip bit is set
    pub fn drawn_points(&self, paths: &[Polyline]) -> Vec<Point> {
        let pts = paths[self.index].points();
        if self.flipped {
            pts.iter().rev().copied().collect()
        } else {
            pts.to_vec()
        }
    }
}

/// An ordering over path indices with per-position flip bits.
///
/// Invariants: each original index appears at most once, and the entries
/// are a permutation of the surviving-path indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSequence {
    entries: Vec<SequenceEntry>,
}

impl PathSequence {
    pub fn new(entries: Vec<SequenceEntry>) -> Self {
        Self { entries }
    }

    /// Identity sequence over the given indices, nothing flipped
    pub fn identity(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            entries: indices
                .into_iter()
                .map(|index| SequenceEntry::new(index, false))
                .collect(),
        }
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the entries visit exactly the given original indices,
    /// each once, in any order. The optimizer checks this after every
    /// stage hand-off; a violation is an internal error.
    pub fn is_permutation_of(&self, indices: &[usize]) -> bool {
        if self.entries.len() != indices.len() {
            return false;
        }
        let mut seen: Vec<usize> = self.entries.iter().map(|e| e.index).collect();
        seen.sort_unstable();
        let mut expected = indices.to_vec();
        expected.sort_unstable();
        seen == expected
    }

    /// Total pen-up travel for this ordering: the hop from the origin to
    /// the first touchdown plus every lift-to-touchdown gap between
    /// consecutive entries.
    pub fn pen_up(&self, paths: &[Polyline]) -> f64 {
        let mut head = ORIGIN;
        let mut total = 0.0;
        for entry in &self.entries {
            total += dist(head, entry.effective_start(paths));
            head = entry.effective_end(paths);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> Polyline {
        Polyline::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn test_draw_length() {
        let p = line(&[(0.0, 0.0), (3.0, 4.0), (3.0, 14.0)]);
        assert_eq!(p.draw_length(), 15.0); // 5 + 10
        assert_eq!(p.start(), Point::new(0.0, 0.0));
        assert_eq!(p.end(), Point::new(3.0, 14.0));
    }

    #[test]
    fn test_flip_swaps_effective_endpoints() {
        let paths = vec![line(&[(1.0, 2.0), (5.0, 6.0)])];

        let fwd = SequenceEntry::new(0, false);
        assert_eq!(fwd.effective_start(&paths), Point::new(1.0, 2.0));
        assert_eq!(fwd.effective_end(&paths), Point::new(5.0, 6.0));

        let rev = SequenceEntry::new(0, true);
        assert_eq!(rev.effective_start(&paths), Point::new(5.0, 6.0));
        assert_eq!(rev.effective_end(&paths), Point::new(1.0, 2.0));
    }

    #[test]
    fn test_drawn_points_round_trip() {
        // Emitting a flipped path and re-ingesting the emitted polyline
        // reproduces the same geometry (reversed point order, same set of
        // segments).
        let paths = vec![line(&[(0.0, 0.0), (1.0, 0.0), (2.0, 1.0)])];
        let entry = SequenceEntry::new(0, true);

        let drawn = entry.drawn_points(&paths);
        assert_eq!(drawn[0], Point::new(2.0, 1.0));
        assert_eq!(drawn[2], Point::new(0.0, 0.0));

        let re_ingested = Polyline::new(drawn);
        assert_eq!(re_ingested.draw_length(), paths[0].draw_length());
        assert_eq!(re_ingested.start(), paths[0].end());
        assert_eq!(re_ingested.end(), paths[0].start());
    }

    #[test]
    fn test_pen_up_from_origin() {
        let paths = vec![
            line(&[(0.0, 0.0), (1.0, 0.0)]),
            line(&[(2.0, 0.0), (3.0, 0.0)]),
        ];

        // Origin hop is zero (first path starts at the origin), then a
        // 1 mm gap between the paths.
        let seq = PathSequence::identity([0, 1]);
        assert_eq!(seq.pen_up(&paths), 1.0);

        // Flipping the second path moves its touchdown to (3, 0).
        let seq = PathSequence::new(vec![
            SequenceEntry::new(0, false),
            SequenceEntry::new(1, true),
        ]);
        assert_eq!(seq.pen_up(&paths), 2.0);
    }

    #[test]
    fn test_pen_up_empty_sequence() {
        let paths: Vec<Polyline> = Vec::new();
        assert_eq!(PathSequence::default().pen_up(&paths), 0.0);
    }
}
