//! 2-opt refinement (phase 2)
//!
//! First-improvement local search over the greedy ordering. A move
//! reverses the sub-range `[i..j]` of the sequence and, because paths are
//! oriented, also flips the draw direction of every path in the range;
//! plain reversal alone would not be cost-equivalent.
//!
//! # Buffer layout
//!
//! The whole tour lives in six parallel buffers `sx/sy/ex/ey/order/flipped`
//! allocated once at entry and reordered in place - the scan is O(n²) per
//! pass and cache locality on the coordinate arrays is what makes it
//! tolerable. No per-iteration allocation.
//!
//! # Cost model
//!
//! Reversing `[i..j]` only changes two pen-up gaps: the one entering the
//! range and the one leaving it. With `prev` = effective end of `i-1`
//! (the origin when `i == 0`) and `next` = effective start of `j+1`
//! (absent at the tail):
//!
//! ```text
//! current = |prev - start(i)| + |end(j) - next|
//! moved   = |prev - end(j)|   + |start(i) - next|
//! ```
//!
//! A move is taken when `moved < current - EPSILON`; the strict margin
//! keeps rounding noise from oscillating forever. Each taken move ends
//! the pass (first-improvement), records one history sample, and counts
//! as one iteration; a pass that scans every pair without improvement
//! terminates the search.

use crate::error::Result;
use crate::optimizer::JobContext;
use crate::path::{PathSequence, Polyline, SequenceEntry};
use crate::progress::ProgressEvent;

/// Strict improvement margin in mm; below this a move is noise
pub const IMPROVEMENT_EPSILON: f64 = 1e-6;

/// Output of the 2-opt refiner
#[derive(Debug, Clone)]
pub struct TwoOptOutcome {
    /// Refined ordering with flip bits
    pub sequence: PathSequence,
    /// Pen-up after each improving pass; the first element is the input
    /// baseline, so `len() == iterations + 1`
    pub dist_history: Vec<f64>,
    /// Number of improving passes applied
    pub iterations: usize,
    /// Pen-up of the input ordering (the greedy baseline)
    pub original_dist: f64,
    /// Pen-up of the refined ordering
    pub final_dist: f64,
}

/// The tour as six parallel buffers. `sx/sy` and `ex/ey` hold *effective*
/// endpoints: a flipped entry stores its geometric end in `sx/sy`.
struct TourBuffers {
    sx: Vec<f64>,
    sy: Vec<f64>,
    ex: Vec<f64>,
    ey: Vec<f64>,
    order: Vec<u32>,
    flipped: Vec<bool>,
}

impl TourBuffers {
    fn from_sequence(paths: &[Polyline], seq: &PathSequence) -> Self {
        let n = seq.len();
        let mut buffers = Self {
            sx: Vec::with_capacity(n),
            sy: Vec::with_capacity(n),
            ex: Vec::with_capacity(n),
            ey: Vec::with_capacity(n),
            order: Vec::with_capacity(n),
            flipped: Vec::with_capacity(n),
        };
        for entry in seq.entries() {
            let s = entry.effective_start(paths);
            let e = entry.effective_end(paths);
            buffers.sx.push(s.x);
            buffers.sy.push(s.y);
            buffers.ex.push(e.x);
            buffers.ey.push(e.y);
            buffers.order.push(entry.index as u32);
            buffers.flipped.push(entry.flipped);
        }
        buffers
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Pen-up travel of the current tour, from the origin
    fn pen_up(&self) -> f64 {
        let n = self.len();
        if n == 0 {
            return 0.0;
        }
        let mut total = (self.sx[0] * self.sx[0] + self.sy[0] * self.sy[0]).sqrt();
        for i in 0..n - 1 {
            let dx = self.ex[i] - self.sx[i + 1];
            let dy = self.ey[i] - self.sy[i + 1];
            total += (dx * dx + dy * dy).sqrt();
        }
        total
    }

    #[inline]
    fn gap(&self, from_x: f64, from_y: f64, to_x: f64, to_y: f64) -> f64 {
        let dx = from_x - to_x;
        let dy = from_y - to_y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Reverse positions `[i..=j]` and flip the draw direction of every
    /// element in the range, in place across all six buffers.
    fn reverse_range(&mut self, i: usize, j: usize) {
        let (mut a, mut b) = (i, j);
        while a < b {
            self.sx.swap(a, b);
            self.sy.swap(a, b);
            self.ex.swap(a, b);
            self.ey.swap(a, b);
            self.order.swap(a, b);
            self.flipped.swap(a, b);
            a += 1;
            b -= 1;
        }
        for k in i..=j {
            std::mem::swap(&mut self.sx[k], &mut self.ex[k]);
            std::mem::swap(&mut self.sy[k], &mut self.ey[k]);
            self.flipped[k] = !self.flipped[k];
        }
    }

    fn to_sequence(&self) -> PathSequence {
        PathSequence::new(
            self.order
                .iter()
                .zip(self.flipped.iter())
                .map(|(&idx, &flip)| SequenceEntry::new(idx as usize, flip))
                .collect(),
        )
    }
}

/// Refine `seq` with first-improvement 2-opt, capped at `max_iterations`
/// improving passes.
///
/// Emits `twoopt_start` at entry and `phase2_result` at completion; on
/// cancellation (polled at pass boundaries) neither a result event nor a
/// refined sequence is produced.
pub fn refine(
    paths: &[Polyline],
    seq: PathSequence,
    max_iterations: usize,
    ctx: &mut JobContext<'_>,
) -> Result<TwoOptOutcome> {
    ctx.push(ProgressEvent::TwooptStart);

    let mut buffers = TourBuffers::from_sequence(paths, &seq);
    let n = buffers.len();

    let baseline = buffers.pen_up();
    let mut dist_history = vec![baseline];
    let mut iterations = 0usize;

    if n >= 2 {
        while iterations < max_iterations {
            ctx.check_cancelled()?;

            let improved = improving_pass(&mut buffers);
            if !improved {
                break;
            }
            iterations += 1;
            let d = buffers.pen_up();
            tracing::debug!(pass = iterations, pen_up = d, "2-opt improvement");
            dist_history.push(d);
        }
    }

    let sequence = buffers.to_sequence();
    let final_dist = *dist_history.last().expect("history starts non-empty");

    ctx.push(ProgressEvent::Phase2Result {
        dist_history: dist_history.clone(),
        iterations,
        final_dist,
        original_dist: baseline,
        paths: sequence.entries().to_vec(),
    });

    Ok(TwoOptOutcome {
        sequence,
        dist_history,
        iterations,
        original_dist: baseline,
        final_dist,
    })
}

/// Scan all `(i, j)` pairs in order and apply the first improving move.
/// Returns whether a move was applied.
fn improving_pass(buffers: &mut TourBuffers) -> bool {
    let n = buffers.len();
    if n < 2 {
        return false;
    }
    for i in 0..n - 1 {
        // Effective end of the element before the range; the origin for
        // i == 0.
        let (prev_x, prev_y) = if i > 0 {
            (buffers.ex[i - 1], buffers.ey[i - 1])
        } else {
            (0.0, 0.0)
        };

        for j in i + 1..n {
            let mut current = buffers.gap(prev_x, prev_y, buffers.sx[i], buffers.sy[i]);
            let mut moved = buffers.gap(prev_x, prev_y, buffers.ex[j], buffers.ey[j]);
            if j + 1 < n {
                current += buffers.gap(
                    buffers.ex[j],
                    buffers.ey[j],
                    buffers.sx[j + 1],
                    buffers.sy[j + 1],
                );
                moved += buffers.gap(
                    buffers.sx[i],
                    buffers.sy[i],
                    buffers.sx[j + 1],
                    buffers.sy[j + 1],
                );
            }

            if moved < current - IMPROVEMENT_EPSILON {
                buffers.reverse_range(i, j);
                return true;
            }
        }
    }
    false
}
