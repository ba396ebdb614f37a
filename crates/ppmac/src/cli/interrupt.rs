//! Ctrl-C delivery to the running command

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use ppmac_config::LogType;

/// Broadcasts interrupts to whichever command is currently listening.
/// Unlike a shutdown, an interrupt is not latched: a command only sees
/// interrupts that arrive after it subscribed.
#[derive(Debug)]
pub struct InterruptController {
    tx: broadcast::Sender<()>,
}

impl InterruptController {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(4);
        Arc::new(Self { tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Returns the number of commands that received it.
    pub fn trigger(&self, reason: &str) -> usize {
        let receivers = self.tx.send(()).unwrap_or(0);
        debug!(
            log_type = LogType::Console.as_str(),
            "Interrupt ({}) delivered to {} listener(s)", reason, receivers
        );
        receivers
    }

    /// Forwards Ctrl-C to listeners until the runtime shuts down.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) {
        let controller = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                controller.trigger("ctrl-c");
            }
        });
    }
}
