//! Pipeline entry point
//!
//! `optimize()` runs the three stages in order - overlap filter, greedy
//! nearest-neighbor ordering, 2-opt refinement - and streams progress
//! events to the caller's bus. Data flows strictly forward; no stage
//! revisits an earlier one.
//!
//! Per-job state (the progress sender and the cancellation flag) is
//! bundled into a [`JobContext`] and passed into each stage; nothing is
//! process-global, so callers may run unrelated jobs on separate engine
//! instances in parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::PlotConfig;
use crate::error::{OptimizeError, Result};
use crate::filter::{self, FilterOutcome};
use crate::greedy;
use crate::path::{PathSequence, Polyline};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::two_opt;

/// Cooperative cancellation flag, polled by the stages at pass
/// boundaries. Clone it and trip it from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-job state handed into each stage: the progress bus producer and
/// the cancellation flag.
pub struct JobContext<'a> {
    progress: &'a mut ProgressSender,
    cancel: &'a CancelFlag,
}

impl<'a> JobContext<'a> {
    pub fn new(progress: &'a mut ProgressSender, cancel: &'a CancelFlag) -> Self {
        Self { progress, cancel }
    }

    /// Push an event onto the job's bus
    pub fn push(&mut self, event: ProgressEvent) {
        self.progress.push(event);
    }

    /// Err(`Cancelled`) once the flag has tripped
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(OptimizeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a caller needs to re-emit the job: the final ordering with
/// flip bits, the filter partition, and the refinement statistics.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Final ordering over the surviving original path indices
    pub sequence: PathSequence,
    /// Which input paths survived the overlap filter
    pub filter: FilterOutcome,
    /// Pen-up after each improving 2-opt pass; first element is the
    /// greedy baseline
    pub pen_up_history: Vec<f64>,
    /// Improving 2-opt passes applied
    pub iterations: usize,
    /// Pen-up of the greedy ordering (the refiner's baseline)
    pub original_pen_up: f64,
    /// Pen-up of the final ordering
    pub final_pen_up: f64,
}

/// Run the full pipeline over `paths`.
///
/// Fatal ingress errors (`EmptyInput`, `MalformedPath`, `ConfigRange`)
/// surface before any stage runs. Every outcome - success, ingress
/// rejection, cancellation - closes the event stream with `complete`;
/// failures are narrated by a `log` event first.
pub fn optimize(
    paths: &[Polyline],
    config: &PlotConfig,
    progress: &mut ProgressSender,
    cancel: &CancelFlag,
) -> Result<OptimizationResult> {
    let mut ctx = JobContext::new(progress, cancel);
    let result = run_stages(paths, config, &mut ctx);

    if let Err(err) = &result {
        let msg = match err {
            OptimizeError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };
        ctx.push(ProgressEvent::Log { msg });
    }
    ctx.push(ProgressEvent::Complete);

    result
}

fn run_stages(
    paths: &[Polyline],
    config: &PlotConfig,
    ctx: &mut JobContext<'_>,
) -> Result<OptimizationResult> {
    let started = Instant::now();

    if paths.is_empty() {
        return Err(OptimizeError::EmptyInput);
    }
    config.validate()?;
    validate_paths(paths)?;

    tracing::info!(
        paths = paths.len(),
        pen_width = config.pen_width,
        "starting toolpath optimization"
    );

    // Phase 0: overlap filter.
    ctx.push(ProgressEvent::FilterStart {
        path_count: paths.len(),
        pen_width: config.pen_width,
        visibility_threshold: config.visibility_threshold,
    });
    let filter = filter::filter_paths(paths, config);
    ctx.push(ProgressEvent::FilterResult {
        original_count: paths.len(),
        kept_count: filter.kept_indices.len(),
        removed_count: filter.removed_indices.len(),
        removed_indices: filter.removed_indices.clone(),
        pen_width: config.pen_width,
        visibility_threshold: config.visibility_threshold,
    });

    // Phase 1: greedy ordering.
    let greedy_outcome = greedy::order_paths(paths, &filter.kept_indices, ctx)?;
    ensure_permutation(&greedy_outcome.sequence, &filter.kept_indices)?;

    // Phase 2: 2-opt refinement.
    let refined = two_opt::refine(
        paths,
        greedy_outcome.sequence,
        config.max_iterations as usize,
        ctx,
    )?;
    ensure_permutation(&refined.sequence, &filter.kept_indices)?;

    tracing::info!(
        kept = filter.kept_indices.len(),
        removed = filter.removed_indices.len(),
        original_dist = refined.original_dist,
        final_dist = refined.final_dist,
        iterations = refined.iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "optimization done"
    );

    Ok(OptimizationResult {
        sequence: refined.sequence,
        filter,
        pen_up_history: refined.dist_history,
        iterations: refined.iterations,
        original_pen_up: refined.original_dist,
        final_pen_up: refined.final_dist,
    })
}

/// Reject paths with fewer than two points or non-finite coordinates
fn validate_paths(paths: &[Polyline]) -> Result<()> {
    for (index, path) in paths.iter().enumerate() {
        if path.len() < 2 {
            return Err(OptimizeError::MalformedPath {
                index,
                reason: format!("{} point(s), need at least 2", path.len()),
            });
        }
        if !path.points().iter().all(|p| p.is_finite()) {
            return Err(OptimizeError::MalformedPath {
                index,
                reason: "non-finite coordinate".to_string(),
            });
        }
    }
    Ok(())
}

/// A stage hand-off that lost or duplicated a path is an internal error
fn ensure_permutation(sequence: &PathSequence, kept: &[usize]) -> Result<()> {
    if sequence.is_permutation_of(kept) {
        Ok(())
    } else {
        Err(OptimizeError::Internal(format!(
            "sequence of {} entries is not a permutation of the {} surviving paths",
            sequence.len(),
            kept.len()
        )))
    }
}
