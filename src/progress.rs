//! Progress bus: the optimizer's only suspension point
//!
//! A single-producer/single-consumer ordered queue of typed events. Stages
//! push into it; one consumer (a WebSocket bridge, the CLI's event thread,
//! a test harness) drains it. Delivery order is the production order for
//! any given job.
//!
//! # Drop policy
//!
//! Two classes of event:
//! - **Coalescable** (`progress`, `ping`): when the queue is full the
//!   oldest coalescable event is evicted to make room; `progress` enqueues
//!   are additionally throttled to one per 5 ms.
//! - **Guaranteed** (everything else): never dropped. If the queue is full
//!   of guaranteed events the producer blocks briefly until the consumer
//!   drains one.
//!
//! Neither crossbeam nor tokio channels can express evict-oldest-of-kind,
//! so the queue is a bounded `VecDeque` under a `parking_lot` mutex and
//! condvars.
//!
//! # Wire format
//!
//! Each event serializes as a tagged JSON record with a `type`
//! discriminator. Field names are stable and case-sensitive; a UI client
//! consumes this format bit-exactly, so the serialization tests below pin
//! the full shape of every kind.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::path::SequenceEntry;

/// Default coalescing window for `progress` events
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(5);

/// One greedy placement decision: which original path was placed, and
/// whether it was reversed to bring its nearer endpoint first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub original_index: usize,
    pub reversed: bool,
}

/// Typed events pushed by the pipeline stages, in the order a consumer
/// observes them for a successful job: `filter_start`, `filter_result`,
/// `progress`*, `greedy_result`, `twoopt_start`, `phase2_result`,
/// `complete`. `log` and `ping` may appear anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    FilterStart {
        path_count: usize,
        pen_width: f64,
        visibility_threshold: f64,
    },
    FilterResult {
        original_count: usize,
        kept_count: usize,
        removed_count: usize,
        removed_indices: Vec<usize>,
        pen_width: f64,
        visibility_threshold: f64,
    },
    Progress {
        phase: u32,
        current: usize,
        total: usize,
        latest_path: Placement,
    },
    GreedyResult {
        path_count: usize,
        progress_history: Vec<Placement>,
        original_dist: f64,
        phase1_dist: f64,
        paths: Vec<SequenceEntry>,
    },
    TwooptStart,
    Phase2Result {
        dist_history: Vec<f64>,
        iterations: usize,
        final_dist: f64,
        original_dist: f64,
        paths: Vec<SequenceEntry>,
    },
    Log {
        msg: String,
    },
    Complete,
    Ping,
}

impl ProgressEvent {
    /// Coalescable events may be evicted or throttled; guaranteed events
    /// are always delivered.
    pub fn coalescable(&self) -> bool {
        matches!(self, ProgressEvent::Progress { .. } | ProgressEvent::Ping)
    }
}

struct BusState {
    events: VecDeque<ProgressEvent>,
    closed: bool,
}

struct BusShared {
    state: Mutex<BusState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

/// Producer half of the bus. Owned by the job; stages push through it.
pub struct ProgressSender {
    shared: Arc<BusShared>,
    throttle: Duration,
    last_progress: Option<Instant>,
}

/// Consumer half of the bus. `recv` blocks until an event arrives or the
/// producer closes the stream.
pub struct ProgressReceiver {
    shared: Arc<BusShared>,
}

/// Create a bounded progress bus with the default 5 ms progress throttle
pub fn channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    channel_with_throttle(capacity, PROGRESS_THROTTLE)
}

/// Create a bounded progress bus with an explicit throttle window.
/// A zero throttle disables coalescing-by-time (eviction still applies).
pub fn channel_with_throttle(
    capacity: usize,
    throttle: Duration,
) -> (ProgressSender, ProgressReceiver) {
    assert!(capacity > 0, "progress bus capacity must be > 0");
    let shared = Arc::new(BusShared {
        state: Mutex::new(BusState {
            events: VecDeque::with_capacity(capacity),
            closed: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity,
    });
    (
        ProgressSender {
            shared: Arc::clone(&shared),
            throttle,
            last_progress: None,
        },
        ProgressReceiver { shared },
    )
}

impl ProgressSender {
    /// Push an event, applying the per-kind policy. Never blocks for
    /// coalescable events; blocks only when the queue is full of
    /// guaranteed events.
    pub fn push(&mut self, event: ProgressEvent) {
        if event.coalescable() {
            if matches!(event, ProgressEvent::Progress { .. }) {
                let now = Instant::now();
                if let Some(last) = self.last_progress {
                    if now.duration_since(last) < self.throttle {
                        return; // coalesced into the previous enqueue
                    }
                }
                self.last_progress = Some(now);
            }
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            if state.events.len() >= self.shared.capacity {
                match state.events.iter().position(|e| e.coalescable()) {
                    Some(pos) => {
                        let _ = state.events.remove(pos);
                    }
                    // Full of guaranteed events; a droppable event is not
                    // worth blocking for.
                    None => return,
                }
            }
            state.events.push_back(event);
            drop(state);
            self.shared.readable.notify_one();
        } else {
            let mut state = self.shared.state.lock();
            loop {
                if state.closed {
                    return;
                }
                if state.events.len() < self.shared.capacity {
                    break;
                }
                if let Some(pos) = state.events.iter().position(|e| e.coalescable()) {
                    let _ = state.events.remove(pos);
                    break;
                }
                self.shared.writable.wait(&mut state);
            }
            state.events.push_back(event);
            drop(state);
            self.shared.readable.notify_one();
        }
    }

    /// Close the stream. Queued events stay readable; `recv` returns
    /// `None` once they are drained.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        drop(state);
        self.shared.readable.notify_all();
        self.shared.writable.notify_all();
    }
}

impl Drop for ProgressSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl ProgressReceiver {
    /// Blocking receive. Returns `None` when the stream is closed and
    /// fully drained.
    pub fn recv(&self) -> Option<ProgressEvent> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                drop(state);
                self.shared.writable.notify_one();
                return Some(event);
            }
            if state.closed {
                return None;
            }
            self.shared.readable.wait(&mut state);
        }
    }

    /// Non-blocking receive
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        let mut state = self.shared.state.lock();
        let event = state.events.pop_front();
        drop(state);
        if event.is_some() {
            self.shared.writable.notify_one();
        }
        event
    }

    /// Drain everything currently queued without blocking
    pub fn drain(&self) -> Vec<ProgressEvent> {
        let mut state = self.shared.state.lock();
        let events: Vec<_> = state.events.drain(..).collect();
        drop(state);
        if !events.is_empty() {
            self.shared.writable.notify_all();
        }
        events
    }
}

impl Iterator for ProgressReceiver {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        self.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn progress(current: usize) -> ProgressEvent {
        ProgressEvent::Progress {
            phase: 1,
            current,
            total: 10,
            latest_path: Placement {
                original_index: current,
                reversed: false,
            },
        }
    }

    fn log(msg: &str) -> ProgressEvent {
        ProgressEvent::Log {
            msg: msg.to_string(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let (mut tx, rx) = channel_with_throttle(16, Duration::ZERO);
        tx.push(log("a"));
        tx.push(progress(1));
        tx.push(log("b"));
        tx.close();

        let events: Vec<_> = rx.collect();
        assert_eq!(events, vec![log("a"), progress(1), log("b")]);
    }

    #[test]
    fn test_full_queue_evicts_oldest_coalescable() {
        let (mut tx, rx) = channel_with_throttle(2, Duration::ZERO);
        tx.push(progress(1));
        tx.push(progress(2));
        tx.push(progress(3)); // queue full: evicts progress(1)

        assert_eq!(rx.drain(), vec![progress(2), progress(3)]);
    }

    #[test]
    fn test_guaranteed_events_displace_coalescable() {
        let (mut tx, rx) = channel_with_throttle(2, Duration::ZERO);
        tx.push(progress(1));
        tx.push(log("result"));
        // Full. The new progress evicts the old one...
        tx.push(progress(2));
        // ...and a guaranteed event evicts the remaining progress rather
        // than being dropped or blocking.
        tx.push(ProgressEvent::Complete);

        assert_eq!(rx.drain(), vec![log("result"), ProgressEvent::Complete]);
    }

    #[test]
    fn test_coalescable_dropped_when_full_of_guaranteed() {
        let (mut tx, rx) = channel_with_throttle(2, Duration::ZERO);
        tx.push(log("a"));
        tx.push(log("b"));
        tx.push(progress(1)); // nothing evictable; silently dropped

        assert_eq!(rx.drain(), vec![log("a"), log("b")]);
    }

    #[test]
    fn test_progress_throttled() {
        // An hour-long window: the second progress push must coalesce.
        let (mut tx, rx) = channel_with_throttle(16, Duration::from_secs(3600));
        tx.push(progress(1));
        tx.push(progress(2));
        // Ping is a heartbeat, not subject to the progress throttle.
        tx.push(ProgressEvent::Ping);
        tx.close();

        let events: Vec<_> = rx.collect();
        assert_eq!(events, vec![progress(1), ProgressEvent::Ping]);
    }

    #[test]
    fn test_guaranteed_push_blocks_until_drained() {
        let (mut tx, rx) = channel_with_throttle(1, Duration::ZERO);
        tx.push(log("first"));

        let consumer = thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv() {
                seen.push(event);
            }
            seen
        });

        // Queue is full of guaranteed events: this push blocks until the
        // consumer thread drains "first".
        tx.push(log("second"));
        tx.close();

        let seen = consumer.join().unwrap();
        assert_eq!(seen, vec![log("first"), log("second")]);
    }

    #[test]
    fn test_recv_returns_none_after_close() {
        let (mut tx, rx) = channel(4);
        tx.push(log("only"));
        tx.close();
        assert_eq!(rx.recv(), Some(log("only")));
        assert_eq!(rx.recv(), None);
    }

    // ============ Wire format ============
    //
    // External contract: a UI client consumes these records. Field names
    // and the `type` discriminator are pinned exactly.

    #[test]
    fn test_wire_filter_events() {
        let event = ProgressEvent::FilterStart {
            path_count: 3,
            pen_width: 0.5,
            visibility_threshold: 50.0,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"filter_start","path_count":3,"pen_width":0.5,"visibility_threshold":50.0}"#
        );

        let event = ProgressEvent::FilterResult {
            original_count: 3,
            kept_count: 2,
            removed_count: 1,
            removed_indices: vec![1],
            pen_width: 0.5,
            visibility_threshold: 50.0,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"filter_result","original_count":3,"kept_count":2,"removed_count":1,"removed_indices":[1],"pen_width":0.5,"visibility_threshold":50.0}"#
        );
    }

    #[test]
    fn test_wire_progress_and_greedy_result() {
        let event = progress(2);
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"progress","phase":1,"current":2,"total":10,"latest_path":{"original_index":2,"reversed":false}}"#
        );

        let event = ProgressEvent::GreedyResult {
            path_count: 1,
            progress_history: vec![Placement {
                original_index: 0,
                reversed: true,
            }],
            original_dist: 2.0,
            phase1_dist: 1.0,
            paths: vec![SequenceEntry::new(0, true)],
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"greedy_result","path_count":1,"progress_history":[{"original_index":0,"reversed":true}],"original_dist":2.0,"phase1_dist":1.0,"paths":[{"index":0,"flipped":true}]}"#
        );
    }

    #[test]
    fn test_wire_twoopt_events() {
        assert_eq!(
            serde_json::to_string(&ProgressEvent::TwooptStart).unwrap(),
            r#"{"type":"twoopt_start"}"#
        );

        let event = ProgressEvent::Phase2Result {
            dist_history: vec![30.0, 20.0],
            iterations: 1,
            final_dist: 20.0,
            original_dist: 30.0,
            paths: vec![SequenceEntry::new(0, false)],
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"phase2_result","dist_history":[30.0,20.0],"iterations":1,"final_dist":20.0,"original_dist":30.0,"paths":[{"index":0,"flipped":false}]}"#
        );
    }

    #[test]
    fn test_wire_markers_round_trip() {
        for event in [
            ProgressEvent::Log {
                msg: "cancelled".to_string(),
            },
            ProgressEvent::Complete,
            ProgressEvent::Ping,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            let back: ProgressEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
        assert_eq!(
            serde_json::to_string(&ProgressEvent::Complete).unwrap(),
            r#"{"type":"complete"}"#
        );
    }
}
