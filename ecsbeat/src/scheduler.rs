//! Scheduled topology refresh, one worker per cluster.
//!
//! Every cluster with a non-zero `cfg_refresh` gets its own task and timer.
//! Workers share nothing but the shutdown signal; a slow management API on
//! one cluster only delays that cluster.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::cluster::EcsCluster;
use crate::fleet::EcsClusters;

/// Broadcast shutdown flag shared by all refresh workers.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the periodic refresh of every auto-refreshing cluster until
/// `shutdown` flips to `true` (or its sender goes away).
///
/// Returns once every worker has stopped. A refresh already running when
/// shutdown fires is allowed to finish; no new one starts afterwards.
pub async fn start_refresh_config(fleet: &EcsClusters, shutdown: watch::Receiver<bool>) {
    let mut workers = Vec::new();
    for cluster in fleet.clusters() {
        if !cluster.auto_refresh() {
            debug!(customer = %cluster.customer_name(), "Scheduled refresh disabled");
            continue;
        }
        let name = cluster.customer_name().to_string();
        let handle = tokio::spawn(run_worker(Arc::clone(cluster), shutdown.clone()));
        workers.push((name, handle));
    }

    info!(workers = workers.len(), "Refresh scheduler started");

    for (customer, handle) in workers {
        if let Err(e) = handle.await {
            error!(customer = %customer, "Refresh worker aborted: {}", e);
        }
    }

    info!("Refresh scheduler stopped");
}

async fn run_worker(cluster: Arc<EcsCluster>, mut shutdown: watch::Receiver<bool>) {
    let period = cluster.cfg_refresh();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        customer = %cluster.customer_name(),
        period_secs = period.as_secs_f64(),
        "Refresh worker running"
    );

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {
                // Scheduled refreshes never add nodes.
                cluster.refresh(false).await;
            }
        }
    }

    debug!(customer = %cluster.customer_name(), "Refresh worker stopped");
}

/// Resolves once shutdown is signalled. A dropped sender counts as shutdown.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
