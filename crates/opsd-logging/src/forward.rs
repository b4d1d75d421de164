//! Forward `tracing` events to the Supervisor Facade's fan-out channel.
//!
//! Mirrors the teacher's `logging::forward`: a tracing [`Layer`] that
//! forwards rendered events to a sink when one is installed, and is a no-op
//! otherwise. Here the sink is the Facade's [`opsd_protocol::ipc::EventTx`]
//! rather than a UI channel, and the forwarded payload is
//! [`opsd_protocol::FacadeEvent::Log`] (spec §6 "Logging").

use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

use opsd_protocol::{FacadeEvent, ipc::EventTx};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::fmt;

/// Global sink that, when present, forwards log records to connected
/// Facade clients.
static LOG_SINK: OnceLock<Mutex<Option<EventTx>>> = OnceLock::new();

/// Count of log events dropped because a client's event pipeline was full.
static LOG_DROPS: OnceLock<AtomicU64> = OnceLock::new();

fn sink() -> &'static Mutex<Option<EventTx>> {
    LOG_SINK.get_or_init(|| Mutex::new(None))
}

/// Install the forwarding sink (called when a client connects).
pub fn set_sink(tx: EventTx) {
    *sink().lock() = Some(tx);
}

/// Remove the forwarding sink (called when the last client disconnects).
pub fn clear_sink() {
    *sink().lock() = None;
}

/// Tracing layer that forwards rendered events to the installed sink.
pub struct ForwardLayer;

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let tx = { sink().lock().clone() };
        let Some(tx) = tx else { return };

        let record = fmt::to_log_record(event);
        match tx.try_send(FacadeEvent::Log(record)) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => clear_sink(),
            Err(TrySendError::Full(_)) => {
                let ctr = LOG_DROPS.get_or_init(|| AtomicU64::new(0));
                let n = ctr.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 || n.is_multiple_of(1000) {
                    tracing::debug!(count = n, "facade_log_drop");
                }
            }
        }
    }
}

/// Construct the forwarding layer to add to a subscriber.
pub fn layer() -> ForwardLayer {
    ForwardLayer
}
