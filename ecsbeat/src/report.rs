//! Per-refresh outcome reporting.
//!
//! A refresh never fails as a whole; instead every VDC gets a `VdcReport`
//! saying which of its two lookups worked. Reports go to a
//! `RefreshReporter` so staleness is visible somewhere.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

use crate::mgmt::MgmtError;

/// What a successful node-list merge did to one VDC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeMerge {
    pub updated: usize,
    pub added: usize,
    /// Unseen nodes dropped because node creation was off.
    pub ignored: usize,
}

#[derive(Debug)]
pub struct VdcReport {
    pub vdc: String,
    pub identity: Result<(), MgmtError>,
    pub nodes: Result<NodeMerge, MgmtError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdcStatus {
    Ok,
    IdentityFailed,
    NodesFailed,
    Failed,
}

impl VdcReport {
    pub fn status(&self) -> VdcStatus {
        match (&self.identity, &self.nodes) {
            (Ok(()), Ok(_)) => VdcStatus::Ok,
            (Err(_), Ok(_)) => VdcStatus::IdentityFailed,
            (Ok(()), Err(_)) => VdcStatus::NodesFailed,
            (Err(_), Err(_)) => VdcStatus::Failed,
        }
    }
}

#[derive(Debug)]
pub struct ClusterReport {
    pub customer: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub add_node: bool,
    pub vdcs: Vec<VdcReport>,
}

impl ClusterReport {
    pub fn vdc(&self, name: &str) -> Option<&VdcReport> {
        self.vdcs.iter().find(|v| v.vdc == name)
    }

    pub fn failed_vdcs(&self) -> usize {
        self.vdcs
            .iter()
            .filter(|v| v.status() != VdcStatus::Ok)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_vdcs() == 0
    }
}

/// Receives one report per cluster refresh.
pub trait RefreshReporter: Send + Sync {
    fn report(&self, report: &ClusterReport);
}

/// Logs failures at `warn` and a one-line summary per refresh.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl RefreshReporter for TracingReporter {
    fn report(&self, report: &ClusterReport) {
        for vdc in &report.vdcs {
            if let Err(e) = &vdc.identity {
                warn!(customer = %report.customer, vdc = %vdc.vdc, "VDC identity lookup failed: {}", e);
            }
            if let Err(e) = &vdc.nodes {
                warn!(customer = %report.customer, vdc = %vdc.vdc, "Node list lookup failed: {}", e);
            }
        }

        let (updated, added, ignored) = report
            .vdcs
            .iter()
            .filter_map(|v| v.nodes.as_ref().ok())
            .fold((0, 0, 0), |(u, a, i), m| (u + m.updated, a + m.added, i + m.ignored));

        info!(
            customer = %report.customer,
            vdcs = report.vdcs.len(),
            failed = report.failed_vdcs(),
            updated,
            added,
            ignored,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Topology refresh complete"
        );
    }
}
