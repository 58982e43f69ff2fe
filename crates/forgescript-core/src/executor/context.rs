//! Move-only sub-context handle.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::debug;
use tracing::warn;

use super::Job;
use super::stats::StatsCounters;
use crate::host::InterpreterHost;

/// A sub-context borrowed from the executor loop.
///
/// Dropping it schedules destruction on the loop thread. The caller never
/// waits for that destruction; failures are logged and counted in
/// [`ExecutorStats`](super::ExecutorStats).
pub struct SubContext<H: InterpreterHost> {
    id: u64,
    sub: Option<H::Sub>,
    sender: Sender<Job<H>>,
    stats: Arc<StatsCounters>,
}

impl<H: InterpreterHost> SubContext<H> {
    pub(super) fn new(
        id: u64,
        sub: H::Sub,
        sender: Sender<Job<H>>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            id,
            sub: Some(sub),
            sender,
            stats,
        }
    }

    /// Loop-assigned identifier, unique per executor.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the host sub-context.
    pub fn get_mut(&mut self) -> &mut H::Sub {
        // Only `Drop` takes the value out.
        self.sub
            .as_mut()
            .unwrap_or_else(|| unreachable!("sub-context {} used after release", self.id))
    }
}

impl<H: InterpreterHost> Drop for SubContext<H> {
    fn drop(&mut self) {
        let Some(sub) = self.sub.take() else {
            return;
        };

        let id = self.id;
        let stats = Arc::clone(&self.stats);
        stats.scheduled();

        let job: Job<H> = Box::new(move |host, main| {
            match host.destroy_sub(main, sub) {
                Ok(()) => {
                    debug!(
                        thread = thread_name().as_str(),
                        context = id,
                        "destroyed sub-context"
                    );
                    stats.destroyed(true);
                }
                Err(e) => {
                    warn!(context = id, error = %e, "sub-context teardown failed");
                    stats.destroyed(false);
                }
            }
        });

        if self.sender.send(job).is_err() {
            warn!(context = id, "executor loop gone; sub-context leaked");
            self.stats.destroyed(false);
        }
    }
}

impl<H: InterpreterHost> fmt::Debug for SubContext<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubContext")
            .field("id", &self.id)
            .field("released", &self.sub.is_none())
            .finish_non_exhaustive()
    }
}

pub(super) fn thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}
