//! In-memory topology model: VDCs and their member nodes per cluster.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Customer;

/// One member node of a VDC. Keyed by IP inside its `VdcEntry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub ip: String,
    pub name: String,
    pub version: String,
}

impl Node {
    /// A node known only by its IP, as declared in configuration.
    pub fn seeded(ip: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            ip: ip.into(),
            name: String::new(),
            version: String::new(),
        }
    }

    pub fn update(&mut self, id: &str, name: &str, version: &str) {
        self.id = id.to_string();
        self.name = name.to_string();
        self.version = version.to_string();
    }
}

/// Result of applying one observed node to a `VdcEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChange {
    Updated,
    Added,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdcEntry {
    /// Name as configured; also the key used for management API calls.
    pub name: String,
    /// VDC id reported by the server, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// VDC name reported by the server, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default)]
    nodes: BTreeMap<String, Node>,
}

impl VdcEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            server_name: None,
            nodes: BTreeMap::new(),
        }
    }

    pub fn update_identity(&mut self, id: &str, server_name: &str) {
        self.id = Some(id.to_string());
        self.server_name = Some(server_name.to_string());
    }

    /// Insert under the node's own IP, replacing any previous node there.
    pub fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.ip.clone(), node);
    }

    /// Merge one observed node. Known IPs are overwritten in place; unseen
    /// IPs are only inserted when `add_node` is set. Nodes are never removed.
    pub fn observe_node(
        &mut self,
        id: &str,
        ip: &str,
        name: &str,
        version: &str,
        add_node: bool,
    ) -> NodeChange {
        if let Some(node) = self.nodes.get_mut(ip) {
            node.update(id, name, version);
            NodeChange::Updated
        } else if add_node {
            self.insert_node(Node {
                id: id.to_string(),
                ip: ip.to_string(),
                name: name.to_string(),
                version: version.to_string(),
            });
            NodeChange::Added
        } else {
            NodeChange::Ignored
        }
    }

    pub fn node(&self, ip: &str) -> Option<&Node> {
        self.nodes.get(ip)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Every VDC of one customer. The VDC set is fixed once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    vdcs: BTreeMap<String, VdcEntry>,
}

impl ClusterConfig {
    pub fn new(entries: impl IntoIterator<Item = VdcEntry>) -> Self {
        Self {
            vdcs: entries.into_iter().map(|v| (v.name.clone(), v)).collect(),
        }
    }

    /// One entry per declared VDC, seeded with its declared node IPs.
    pub fn from_customer(customer: &Customer) -> Self {
        Self::new(customer.vdcs.iter().map(|vdc| {
            let mut entry = VdcEntry::new(&vdc.name);
            for ip in &vdc.nodes {
                entry.insert_node(Node::seeded(ip));
            }
            entry
        }))
    }

    pub fn vdc(&self, name: &str) -> Option<&VdcEntry> {
        self.vdcs.get(name)
    }

    pub fn vdc_mut(&mut self, name: &str) -> Option<&mut VdcEntry> {
        self.vdcs.get_mut(name)
    }

    pub fn vdc_names(&self) -> Vec<String> {
        self.vdcs.keys().cloned().collect()
    }

    pub fn vdcs(&self) -> impl Iterator<Item = &VdcEntry> {
        self.vdcs.values()
    }

    pub fn len(&self) -> usize {
        self.vdcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vdcs.is_empty()
    }
}
