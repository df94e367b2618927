//! Metric commands: what to collect, at which level, and how often.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::CommandConfig;

/// Scope a metric command is collected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandLevel {
    System,
    Vdc,
    Node,
}

/// An enabled metric-collection command with its effective interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub uri: String,
    #[serde(rename = "type")]
    pub cmd_type: String,
    pub level: CommandLevel,
    pub interval: Duration,
}

impl Command {
    /// `None` for disabled commands. A missing or zero override falls back
    /// to `period`.
    pub fn from_config(cfg: &CommandConfig, period: Duration) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let interval = match cfg.interval {
            Some(i) if !i.is_zero() => i,
            _ => period,
        };
        Some(Self {
            uri: cfg.uri.clone(),
            cmd_type: cfg.cmd_type.clone(),
            level: cfg.level,
            interval,
        })
    }
}
