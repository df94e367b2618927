//! The whole fleet: every enabled customer's cluster plus the metric
//! commands collected against them.

use std::sync::Arc;
use tracing::info;

use common::command::Command;
use common::config::{Customer, EcsbeatConfig};
use common::topology::ClusterConfig;

use crate::cluster::{ClusterSnapshot, EcsCluster};
use crate::mgmt::{HttpMgmtClient, ManagementClient, MgmtError};
use crate::report::{ClusterReport, RefreshReporter};

pub struct EcsClusters {
    cmds: Vec<Command>,
    clusters: Vec<Arc<EcsCluster>>,
}

impl EcsClusters {
    /// One HTTP-backed cluster per enabled customer.
    pub fn new(config: &EcsbeatConfig, reporter: Arc<dyn RefreshReporter>) -> Result<Self, MgmtError> {
        Self::with_client_factory(config, reporter, |customer| {
            let client = HttpMgmtClient::from_customer(customer)?;
            Ok(Arc::new(client) as Arc<dyn ManagementClient>)
        })
    }

    /// Like `new`, with the management client for each customer supplied by
    /// `factory`.
    pub fn with_client_factory<F>(
        config: &EcsbeatConfig,
        reporter: Arc<dyn RefreshReporter>,
        mut factory: F,
    ) -> Result<Self, MgmtError>
    where
        F: FnMut(&Customer) -> Result<Arc<dyn ManagementClient>, MgmtError>,
    {
        let cmds = config
            .commands
            .iter()
            .filter_map(|c| Command::from_config(c, config.period))
            .collect();

        let mut clusters = Vec::new();
        for customer in config.enabled_customers() {
            let cluster = EcsCluster::new(
                &customer.name,
                customer.cfg_refresh,
                ClusterConfig::from_customer(customer),
                factory(customer)?,
            )
            .with_reporter(Arc::clone(&reporter));
            clusters.push(Arc::new(cluster));
        }

        let fleet = Self::from_parts(cmds, clusters);
        info!(
            clusters = fleet.clusters.len(),
            commands = fleet.cmds.len(),
            "Fleet configured"
        );
        Ok(fleet)
    }

    pub fn from_parts(cmds: Vec<Command>, clusters: Vec<Arc<EcsCluster>>) -> Self {
        Self { cmds, clusters }
    }

    pub fn commands(&self) -> &[Command] {
        &self.cmds
    }

    pub fn clusters(&self) -> &[Arc<EcsCluster>] {
        &self.clusters
    }

    pub fn cluster(&self, customer: &str) -> Option<&Arc<EcsCluster>> {
        self.clusters.iter().find(|c| c.customer_name() == customer)
    }

    /// Refresh every cluster now, one after another, in fleet order.
    pub async fn refresh(&self, add_node: bool) -> Vec<ClusterReport> {
        let mut reports = Vec::with_capacity(self.clusters.len());
        for cluster in &self.clusters {
            reports.push(cluster.refresh(add_node).await);
        }
        reports
    }

    pub async fn snapshot(&self) -> Vec<ClusterSnapshot> {
        let mut out = Vec::with_capacity(self.clusters.len());
        for cluster in &self.clusters {
            out.push(cluster.snapshot().await);
        }
        out
    }
}
