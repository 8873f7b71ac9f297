//! Progress/error event aggregation.
//!
//! Workers emit [`Event`]s; a single consumer serializes them into one
//! ordered log. Two modes exist behind the same [`EventSink`] contract so
//! callers never care which is active:
//!
//! * **Direct** — the event is logged synchronously on the emitting thread.
//!   The degenerate single-worker mode: no queue, no consumer.
//! * **Queued** — the event goes into a bounded multi-producer channel and
//!   a lone aggregator drains it. Ordering is queue-arrival order,
//!   interleaved across producers; nothing stronger is promised.
//!
//! ## Shutdown
//!
//! The aggregator terminates only on the [`QueueMessage::Shutdown`]
//! sentinel. The orchestrator enqueues it strictly *after* every worker has
//! been joined, so every event enqueued before the sentinel is logged
//! before the aggregator stops.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Capacity of the queued-mode channel. Producers block when the
/// aggregator falls this far behind, which bounds memory without losing
/// events.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// How long the aggregator waits on an empty queue before polling again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One unit of progress or error information, destined for the aggregated
/// log. Carries no identity beyond its arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub message: String,
    pub is_error: bool,
}

impl Event {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}

/// What travels on the queued-mode channel: an event, or the sentinel
/// announcing that no further events will be produced.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    Event(Event),
    Shutdown,
}

/// Destination for serialized events.
///
/// The production implementation forwards to `tracing`; tests substitute a
/// collecting implementation to assert on ordering and content.
pub trait EventLogger: Send + Sync {
    fn log(&self, event: &Event);
}

/// Logs events through the `tracing` macros, error level for error events.
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn log(&self, event: &Event) {
        if event.is_error {
            error!("{}", event.message);
        } else {
            info!("{}", event.message);
        }
    }
}

/// Cloneable emitting handle given to every worker.
#[derive(Clone)]
pub enum EventSink {
    /// Log synchronously, no queue. Used by the sequential strategy.
    Direct(Arc<dyn EventLogger>),
    /// Enqueue for the aggregator. Used by the pooled strategy.
    Queued(Sender<QueueMessage>),
}

impl EventSink {
    pub fn emit(&self, event: Event) {
        match self {
            EventSink::Direct(logger) => logger.log(&event),
            EventSink::Queued(tx) => {
                // A send can only fail after the aggregator is gone, which
                // the shutdown discipline rules out while workers run.
                if tx.send(QueueMessage::Event(event)).is_err() {
                    warn!("event queue closed before shutdown sentinel");
                }
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Event::info(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Event::error(message));
    }
}

/// Drain the queue until the sentinel arrives, logging every event in
/// arrival order. Returns the number of events logged.
///
/// Blocking; run it on a dedicated thread (the pooled executor uses
/// `tokio::task::spawn_blocking`). The poll interval bounds how long the
/// consumer sleeps between checks on an idle queue.
pub fn drain_events(rx: Receiver<QueueMessage>, logger: Arc<dyn EventLogger>) -> usize {
    let mut drained = 0usize;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(QueueMessage::Event(event)) => {
                logger.log(&event);
                drained += 1;
            }
            Ok(QueueMessage::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                // Every sender dropped without the sentinel. Nothing more
                // can arrive, so stopping cannot lose events, but the
                // orchestrator should have sent the sentinel first.
                warn!("event queue disconnected without a shutdown sentinel");
                break;
            }
        }
    }
    drained
}
