//! Management API seam: the two topology reads the refresh loop needs.
//!
//! The cluster refresh logic only ever talks to a `ManagementClient`;
//! `HttpMgmtClient` is the production implementation, tests plug in
//! scripted ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpMgmtClient;

// ── Response Types ──────────────────────────────────────────────────

/// Identity of the VDC an endpoint belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdcIdentity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub nodeid: String,
    pub ip: String,
    pub nodename: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub node: Vec<NodeInfo>,
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum MgmtError {
    #[error("no management endpoints configured for vdc '{0}'")]
    UnknownVdc(String),
    #[error("all management endpoints for vdc '{0}' are blocked or failing")]
    NoAvailableEndpoint(String),
    #[error("login to {endpoint} returned no auth token")]
    MissingToken { endpoint: String },
    #[error("{endpoint}{path} returned HTTP {status}")]
    Status {
        endpoint: String,
        path: String,
        status: u16,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ── Client Trait ────────────────────────────────────────────────────

#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Identity of the VDC reachable under `vdc`.
    async fn get_local_vdc(&self, vdc: &str) -> Result<VdcIdentity, MgmtError>;

    /// Member nodes of the VDC reachable under `vdc`.
    async fn get_nodes(&self, vdc: &str) -> Result<NodeList, MgmtError>;
}
