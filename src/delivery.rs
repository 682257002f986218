//! Serial delivery context for final continuations.
//!
//! Operations run on arbitrary runtime worker threads, but every final
//! continuation must land on one designated context, in order. This is the
//! library equivalent of a UI main queue: a single task draining an unbounded
//! channel of boxed closures.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a serial delivery queue.
///
/// Cloneable and cheap; all clones feed the same queue. Closures dispatched
/// through any clone run one at a time, in dispatch order, on the queue's
/// task. When the queue task has shut down, `dispatch` becomes a no-op — a
/// continuation whose owner is gone is dropped rather than run on the wrong
/// context.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl DeliveryHandle {
    /// Spawn a delivery queue on the current tokio runtime and return its
    /// handle. The queue task exits once every handle has been dropped and
    /// all dispatched closures have run.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::debug!("delivery queue drained, shutting down");
        });
        Self { tx }
    }

    /// Enqueue a closure to run on the delivery queue.
    ///
    /// Never blocks. Returns whether the closure was accepted; `false` means
    /// the queue is gone and the closure was dropped.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        let accepted = self.tx.send(Box::new(job)).is_ok();
        if !accepted {
            tracing::warn!("delivery queue is gone, dropping dispatched closure");
        }
        accepted
    }
}
