//! Greedy nearest-neighbor ordering (phase 1)
//!
//! From the tool head's home at the origin, repeatedly jump to the nearest
//! endpoint of any unused path; when the far end is strictly closer the
//! path is flipped so the pen touches down there. O(N²) over the endpoint
//! arrays, which is fine for the path counts a plotter job carries.
//!
//! Ties between equidistant candidates break toward the ascending original
//! index: candidates are scanned in index order with a strict `<`, so the
//! first one seen wins. This makes the ordering deterministic.

use crate::error::Result;
use crate::optimizer::JobContext;
use crate::path::{dist, PathSequence, Point, Polyline, SequenceEntry, ORIGIN};
use crate::progress::{Placement, ProgressEvent};

/// Output of the greedy orderer
#[derive(Debug, Clone)]
pub struct GreedyOutcome {
    /// Surviving paths in visit order, with flip bits
    pub sequence: PathSequence,
    /// One placement record per step, in placement order
    pub history: Vec<Placement>,
    /// Pen-up travel of the surviving paths in their original input order
    pub original_dist: f64,
    /// Pen-up travel after greedy ordering
    pub ordered_dist: f64,
}

/// Order the surviving paths (`kept` indexes into `paths`) by greedy
/// nearest-neighbor with direction flipping.
///
/// Emits one throttled `progress` event per placement and a final
/// `greedy_result`. Cancellation is polled once per placement; on
/// cancellation no `greedy_result` is emitted.
pub fn order_paths(
    paths: &[Polyline],
    kept: &[usize],
    ctx: &mut JobContext<'_>,
) -> Result<GreedyOutcome> {
    let n = kept.len();
    let original_dist = PathSequence::identity(kept.iter().copied()).pen_up(paths);

    // Endpoint arrays for the scan loop; indexed by position in `kept`.
    let mut sx = Vec::with_capacity(n);
    let mut sy = Vec::with_capacity(n);
    let mut ex = Vec::with_capacity(n);
    let mut ey = Vec::with_capacity(n);
    for &idx in kept {
        let (s, e) = (paths[idx].start(), paths[idx].end());
        sx.push(s.x);
        sy.push(s.y);
        ex.push(e.x);
        ey.push(e.y);
    }

    let mut used = vec![false; n];
    let mut entries = Vec::with_capacity(n);
    let mut history = Vec::with_capacity(n);
    let mut head = ORIGIN;

    for placed in 0..n {
        ctx.check_cancelled()?;

        let mut best = usize::MAX;
        let mut best_dist = f64::INFINITY;
        let mut best_flip = false;

        for k in 0..n {
            if used[k] {
                continue;
            }
            let ds = dist(head, Point::new(sx[k], sy[k]));
            let de = dist(head, Point::new(ex[k], ey[k]));
            // Flip only when the far end is strictly closer.
            let (d, flip) = if de < ds { (de, true) } else { (ds, false) };
            if d < best_dist {
                best_dist = d;
                best = k;
                best_flip = flip;
            }
        }

        used[best] = true;
        head = if best_flip {
            Point::new(sx[best], sy[best])
        } else {
            Point::new(ex[best], ey[best])
        };

        let placement = Placement {
            original_index: kept[best],
            reversed: best_flip,
        };
        entries.push(SequenceEntry::new(kept[best], best_flip));
        history.push(placement);

        ctx.push(ProgressEvent::Progress {
            phase: 1,
            current: placed + 1,
            total: n,
            latest_path: placement,
        });
    }

    let sequence = PathSequence::new(entries);
    let ordered_dist = sequence.pen_up(paths);

    tracing::debug!(
        paths = n,
        original_dist,
        ordered_dist,
        "greedy ordering done"
    );

    ctx.push(ProgressEvent::GreedyResult {
        path_count: n,
        progress_history: history.clone(),
        original_dist,
        phase1_dist: ordered_dist,
        paths: sequence.entries().to_vec(),
    });

    Ok(GreedyOutcome {
        sequence,
        history,
        original_dist,
        ordered_dist,
    })
}
