//! Run supervision
//!
//! Everything that can end a crawl from outside the crawl loop lives here:
//! - The stop channel carrying interrupt and overload requests
//! - The wall-clock runtime budget
//! - The resource watchdog
//! - The restart marker and the `--supervise` relaunch loop

pub mod budget;
pub mod restart;
pub mod watchdog;

pub use budget::RuntimeBudget;
pub use restart::{supervise, RestartMarker, RESTART_EXIT_CODE};
pub use watchdog::{spawn_watchdog, LoadSampler, LoadState, OverloadDetector, SystemLoadSampler};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why the crawl loop is being asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT / Ctrl+C
    Interrupted,
    /// The watchdog saw sustained overload
    Overloaded,
}

/// Sending half of the stop channel; cheap to clone
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<StopReason>,
}

impl StopHandle {
    /// Asks the crawl loop to stop
    ///
    /// Never blocks. If requests are already queued this one is dropped,
    /// since the loop only acts on the first.
    pub fn request(&self, reason: StopReason) {
        if self.tx.try_send(reason).is_err() {
            tracing::debug!("Stop already requested; ignoring {:?}", reason);
        }
    }
}

/// Receiving half of the stop channel, owned by the crawl loop
#[derive(Debug)]
pub struct StopSignal {
    rx: mpsc::Receiver<StopReason>,
}

impl StopSignal {
    /// Waits for the next stop request
    ///
    /// Returns None once every handle has been dropped.
    pub async fn recv(&mut self) -> Option<StopReason> {
        self.rx.recv().await
    }
}

/// Creates a connected stop handle and signal
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = mpsc::channel(4);
    (StopHandle { tx }, StopSignal { rx })
}

/// Forwards Ctrl+C to the stop channel
pub fn spawn_interrupt_listener(stop: StopHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received. Saving progress and stopping...");
                stop.request(StopReason::Interrupted);
            }
            Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
        }
    })
}
