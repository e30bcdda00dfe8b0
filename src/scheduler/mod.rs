//! Round-robin pollers that keep the roster in step with the remote nodes.
//!
//! Four independent loops share one [`PollContext`]:
//!   height    - tip height per node, rollback detection
//!   status    - syncing flag per node
//!   update    - walks blocks between the walked height and the tip
//!   bootstrap - finds the last block of delegates that have none yet
//!
//! Each loop awaits its tick before sleeping, so a poller never has more than
//! one remote call in flight.

pub mod bootstrap;
pub mod height;
pub mod status;
pub mod update;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::ChainClient;
use crate::clock::Clock;
use crate::config::PollConfig;
use crate::reconcile::Reconciler;
use crate::roster::Roster;

pub use bootstrap::BootstrapPoller;
pub use height::HeightPoller;
pub use status::StatusPoller;
pub use update::UpdatePoller;

/// Everything a poller needs. Cheap to clone.
#[derive(Clone)]
pub struct PollContext {
    pub reconciler: Reconciler,
    pub client: Arc<dyn ChainClient>,
    pub clock: Arc<dyn Clock>,
    pub poll: PollConfig,
}

impl PollContext {
    pub fn roster(&self) -> &Arc<Roster> {
        self.reconciler.roster()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[async_trait]
pub trait Poller: Send {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// One round-robin step.
    async fn tick(&mut self);
}

/// Drive `poller` until the shutdown flag flips.
pub async fn run<P: Poller>(mut poller: P, mut shutdown: watch::Receiver<bool>) {
    let period = poller.interval();
    info!("[SCHEDULER] {} poller started ({:?} tick)", poller.name(), period);
    loop {
        if *shutdown.borrow() {
            break;
        }
        poller.tick().await;
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!("[SCHEDULER] {} poller stopped", poller.name());
}

/// Spawn all four pollers on the current runtime.
pub fn spawn_all(ctx: PollContext, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run(HeightPoller::new(ctx.clone()), shutdown.clone())),
        tokio::spawn(run(StatusPoller::new(ctx.clone()), shutdown.clone())),
        tokio::spawn(run(UpdatePoller::new(ctx.clone()), shutdown.clone())),
        tokio::spawn(run(BootstrapPoller::new(ctx), shutdown)),
    ]
}
