//! Scripted in-memory client for refresh and scheduler tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ManagementClient, MgmtError, NodeInfo, NodeList, VdcIdentity};

#[derive(Default, Clone)]
struct Script {
    /// `None` makes the lookup fail.
    identity: Option<VdcIdentity>,
    nodes: Option<Vec<NodeInfo>>,
}

#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Option<Duration>,
    pub identity_calls: AtomicUsize,
    pub node_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

pub fn node(id: &str, ip: &str, name: &str, version: &str) -> NodeInfo {
    NodeInfo {
        nodeid: id.into(),
        ip: ip.into(),
        nodename: name.into(),
        version: version.into(),
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long (tokio time), to make refreshes observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_vdc(
        self,
        vdc: &str,
        identity: Option<(&str, &str)>,
        nodes: Option<Vec<NodeInfo>>,
    ) -> Self {
        self.set_vdc(vdc, identity, nodes);
        self
    }

    pub fn set_vdc(&self, vdc: &str, identity: Option<(&str, &str)>, nodes: Option<Vec<NodeInfo>>) {
        let script = Script {
            identity: identity.map(|(id, name)| VdcIdentity {
                id: id.into(),
                name: name.into(),
            }),
            nodes,
        };
        self.scripts.lock().unwrap().insert(vdc.to_string(), script);
    }

    fn script(&self, vdc: &str) -> Result<Script, MgmtError> {
        self.scripts
            .lock()
            .unwrap()
            .get(vdc)
            .cloned()
            .ok_or_else(|| MgmtError::UnknownVdc(vdc.to_string()))
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn refreshes(&self) -> usize {
        self.node_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagementClient for ScriptedClient {
    async fn get_local_vdc(&self, vdc: &str) -> Result<VdcIdentity, MgmtError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = self
            .script(vdc)
            .and_then(|s| s.identity.ok_or_else(|| MgmtError::NoAvailableEndpoint(vdc.to_string())));
        self.leave();
        result
    }

    async fn get_nodes(&self, vdc: &str) -> Result<NodeList, MgmtError> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = self.script(vdc).and_then(|s| {
            s.nodes
                .map(|node| NodeList { node })
                .ok_or_else(|| MgmtError::NoAvailableEndpoint(vdc.to_string()))
        });
        self.leave();
        result
    }
}
