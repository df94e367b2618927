//! One customer's cluster: its topology model and how it is refreshed.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::debug;

use common::topology::{ClusterConfig, NodeChange};

use crate::mgmt::{ManagementClient, NodeList};
use crate::report::{ClusterReport, NodeMerge, RefreshReporter, TracingReporter, VdcReport};

pub struct EcsCluster {
    customer_name: String,
    /// Zero disables the scheduled refresh for this cluster.
    cfg_refresh: Duration,
    config: RwLock<ClusterConfig>,
    client: Arc<dyn ManagementClient>,
    reporter: Arc<dyn RefreshReporter>,
    /// Serializes refreshes so two never interleave on one cluster.
    refresh_lock: Mutex<()>,
}

/// Point-in-time copy of a cluster's topology, for emission and output.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub customer: String,
    pub topology: ClusterConfig,
}

impl EcsCluster {
    pub fn new(
        customer_name: impl Into<String>,
        cfg_refresh: Duration,
        config: ClusterConfig,
        client: Arc<dyn ManagementClient>,
    ) -> Self {
        Self {
            customer_name: customer_name.into(),
            cfg_refresh,
            config: RwLock::new(config),
            client,
            reporter: Arc::new(TracingReporter),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RefreshReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn cfg_refresh(&self) -> Duration {
        self.cfg_refresh
    }

    pub fn auto_refresh(&self) -> bool {
        !self.cfg_refresh.is_zero()
    }

    /// Read access to the live model. Hold the guard briefly: refreshes
    /// wait for it before applying results.
    pub async fn read(&self) -> RwLockReadGuard<'_, ClusterConfig> {
        self.config.read().await
    }

    pub async fn snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            customer: self.customer_name.clone(),
            topology: self.config.read().await.clone(),
        }
    }

    /// Bring every VDC up to date with the management API.
    ///
    /// Best effort: a failed lookup leaves that part of the model as it was
    /// and never stops the other lookups. Unseen nodes are only added when
    /// `add_node` is set.
    pub async fn refresh(&self, add_node: bool) -> ClusterReport {
        let _serial = self.refresh_lock.lock().await;
        let started_at = Utc::now();
        let start = Instant::now();

        let names = self.config.read().await.vdc_names();
        let mut vdcs = Vec::with_capacity(names.len());
        for name in &names {
            vdcs.push(self.refresh_vdc(name, add_node).await);
        }

        let report = ClusterReport {
            customer: self.customer_name.clone(),
            started_at,
            elapsed: start.elapsed(),
            add_node,
            vdcs,
        };
        self.reporter.report(&report);
        report
    }

    async fn refresh_vdc(&self, vdc: &str, add_node: bool) -> VdcReport {
        // Identity and nodes are independent: a failed identity lookup must
        // not keep the node list stale.
        let identity = match self.client.get_local_vdc(vdc).await {
            Ok(identity) => {
                if let Some(entry) = self.config.write().await.vdc_mut(vdc) {
                    entry.update_identity(&identity.id, &identity.name);
                }
                Ok(())
            }
            Err(e) => Err(e),
        };

        let nodes = match self.client.get_nodes(vdc).await {
            Ok(list) => Ok(self.merge_nodes(vdc, &list, add_node).await),
            Err(e) => Err(e),
        };

        VdcReport {
            vdc: vdc.to_string(),
            identity,
            nodes,
        }
    }

    /// Nodes missing from `list` are kept; nothing here removes a node.
    async fn merge_nodes(&self, vdc: &str, list: &NodeList, add_node: bool) -> NodeMerge {
        let mut merge = NodeMerge::default();
        let mut config = self.config.write().await;
        let Some(entry) = config.vdc_mut(vdc) else {
            return merge;
        };

        for n in &list.node {
            match entry.observe_node(&n.nodeid, &n.ip, &n.nodename, &n.version, add_node) {
                NodeChange::Updated => merge.updated += 1,
                NodeChange::Added => {
                    debug!(customer = %self.customer_name, vdc, ip = %n.ip, "Discovered node");
                    merge.added += 1;
                }
                NodeChange::Ignored => merge.ignored += 1,
            }
        }
        merge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mgmt::mock::{node, ScriptedClient};
    use crate::report::VdcStatus;
    use common::topology::{Node, VdcEntry};
    use std::sync::Mutex as StdMutex;

    fn vdc(name: &str, ips: &[&str]) -> VdcEntry {
        let mut entry = VdcEntry::new(name);
        for ip in ips {
            entry.insert_node(Node::seeded(*ip));
        }
        entry
    }

    fn topology(vdcs: Vec<VdcEntry>) -> ClusterConfig {
        ClusterConfig::new(vdcs)
    }

    fn cluster(config: ClusterConfig, client: Arc<ScriptedClient>) -> EcsCluster {
        EcsCluster::new("acme", Duration::ZERO, config, client)
    }

    #[tokio::test]
    async fn test_refresh_updates_known_nodes_and_identity() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            Some(("urn:vdc:1", "VDC-1")),
            Some(vec![node("n1", "10.0.0.1", "ecs-1", "3.6")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &["10.0.0.1"])]), client);

        let report = c.refresh(false).await;
        assert!(report.is_clean());

        let cfg = c.read().await;
        let vdc = cfg.vdc("vdc1").unwrap();
        assert_eq!(vdc.id.as_deref(), Some("urn:vdc:1"));
        assert_eq!(vdc.server_name.as_deref(), Some("VDC-1"));
        let n = vdc.node("10.0.0.1").unwrap();
        assert_eq!((n.id.as_str(), n.name.as_str(), n.version.as_str()), ("n1", "ecs-1", "3.6"));
    }

    #[tokio::test]
    async fn test_refresh_without_add_ignores_unseen_nodes() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            Some(("urn:vdc:1", "VDC-1")),
            Some(vec![
                node("n1", "10.0.0.1", "ecs-1", "3.6"),
                node("n9", "10.0.0.9", "ecs-9", "3.6"),
            ]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &["10.0.0.1"])]), client);

        let report = c.refresh(false).await;
        let merge = report.vdc("vdc1").unwrap().nodes.as_ref().unwrap();
        assert_eq!(*merge, NodeMerge { updated: 1, added: 0, ignored: 1 });

        let cfg = c.read().await;
        assert!(cfg.vdc("vdc1").unwrap().node("10.0.0.9").is_none());
        assert_eq!(cfg.vdc("vdc1").unwrap().node_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_with_add_inserts_once() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            None,
            Some(vec![node("n9", "10.0.0.9", "ecs-9", "3.7")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &[])]), client);

        c.refresh(true).await;
        c.refresh(true).await;

        let cfg = c.read().await;
        let vdc = cfg.vdc("vdc1").unwrap();
        assert_eq!(vdc.node_count(), 1);
        assert_eq!(
            vdc.node("10.0.0.9"),
            Some(&Node {
                id: "n9".into(),
                ip: "10.0.0.9".into(),
                name: "ecs-9".into(),
                version: "3.7".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            Some(("urn:vdc:1", "VDC-1")),
            Some(vec![node("n1", "10.0.0.1", "ecs-1", "3.6")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &[])]), client);

        c.refresh(true).await;
        let first = c.snapshot().await.topology;
        c.refresh(true).await;
        assert_eq!(c.snapshot().await.topology, first);
    }

    #[tokio::test]
    async fn test_identity_failure_does_not_block_nodes() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            None,
            Some(vec![node("n1", "10.0.0.1", "ecs-1", "3.6")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &["10.0.0.1"])]), client);

        let report = c.refresh(false).await;
        assert_eq!(report.vdc("vdc1").unwrap().status(), VdcStatus::IdentityFailed);

        let cfg = c.read().await;
        let vdc = cfg.vdc("vdc1").unwrap();
        assert!(vdc.id.is_none());
        assert_eq!(vdc.node("10.0.0.1").unwrap().name, "ecs-1");
    }

    #[tokio::test]
    async fn test_identity_failure_keeps_previous_identity() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            Some(("urn:vdc:1", "VDC-1")),
            Some(vec![node("n1", "10.0.0.1", "ecs-1", "3.6")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &["10.0.0.1"])]), client.clone());
        assert!(c.refresh(false).await.is_clean());

        client.set_vdc("vdc1", None, Some(vec![node("n1", "10.0.0.1", "ecs-1b", "3.7")]));
        let report = c.refresh(false).await;
        assert_eq!(report.vdc("vdc1").unwrap().status(), VdcStatus::IdentityFailed);

        let cfg = c.read().await;
        let vdc = cfg.vdc("vdc1").unwrap();
        assert_eq!(vdc.id.as_deref(), Some("urn:vdc:1"));
        assert_eq!(vdc.server_name.as_deref(), Some("VDC-1"));
        let n = vdc.node("10.0.0.1").unwrap();
        assert_eq!((n.name.as_str(), n.version.as_str()), ("ecs-1b", "3.7"));
    }

    #[tokio::test]
    async fn test_failing_vdc_does_not_block_others() {
        let client = Arc::new(
            ScriptedClient::new()
                .with_vdc("vdc1", None, None)
                .with_vdc("vdc2", Some(("urn:vdc:2", "VDC-2")), Some(vec![node("n2", "10.0.1.1", "ecs-2", "3.6")])),
        );
        let c = cluster(topology(vec![vdc("vdc1", &["10.0.0.1"]), vdc("vdc2", &["10.0.1.1"])]), client);
        let before = c.snapshot().await.topology.vdc("vdc1").cloned();

        let report = c.refresh(false).await;
        assert_eq!(report.vdc("vdc1").unwrap().status(), VdcStatus::Failed);
        assert_eq!(report.vdc("vdc2").unwrap().status(), VdcStatus::Ok);

        let cfg = c.read().await;
        assert_eq!(cfg.vdc("vdc1").cloned(), before);
        assert_eq!(cfg.vdc("vdc2").unwrap().node("10.0.1.1").unwrap().id, "n2");
    }

    #[tokio::test]
    async fn test_absent_node_is_retained() {
        let client = Arc::new(ScriptedClient::new().with_vdc(
            "vdc1",
            None,
            Some(vec![node("n1", "10.0.0.1", "ecs-1", "3.6")]),
        ));
        let c = cluster(topology(vec![vdc("vdc1", &[])]), client.clone());
        c.refresh(true).await;

        client.set_vdc("vdc1", None, Some(vec![]));
        c.refresh(true).await;

        assert!(c.read().await.vdc("vdc1").unwrap().node("10.0.0.1").is_some());
    }

    struct Collecting(StdMutex<Vec<(String, usize)>>);

    impl RefreshReporter for Collecting {
        fn report(&self, report: &ClusterReport) {
            self.0
                .lock()
                .unwrap()
                .push((report.customer.clone(), report.failed_vdcs()));
        }
    }

    #[tokio::test]
    async fn test_reporter_receives_every_refresh() {
        let reporter = Arc::new(Collecting(StdMutex::new(Vec::new())));
        let client = Arc::new(ScriptedClient::new().with_vdc("vdc1", None, Some(vec![])));
        let c = cluster(topology(vec![vdc("vdc1", &[])]), client).with_reporter(reporter.clone());

        c.refresh(false).await;
        c.refresh(true).await;

        let seen = reporter.0.lock().unwrap();
        assert_eq!(*seen, vec![("acme".to_string(), 1), ("acme".to_string(), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_do_not_overlap() {
        let client = Arc::new(
            ScriptedClient::new()
                .with_delay(Duration::from_millis(50))
                .with_vdc("vdc1", None, Some(vec![])),
        );
        let c = Arc::new(cluster(topology(vec![vdc("vdc1", &[])]), client.clone()));

        let a = tokio::spawn({
            let c = c.clone();
            async move { c.refresh(false).await; }
        });
        let b = tokio::spawn({
            let c = c.clone();
            async move { c.refresh(true).await; }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(client.refreshes(), 2);
        assert_eq!(client.max_in_flight.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
