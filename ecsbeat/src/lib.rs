//! ecsbeat keeps an in-memory topology model of a fleet of ECS clusters
//! fresh by polling each cluster's management API.

pub mod cluster;
pub mod fleet;
pub mod mgmt;
pub mod report;
pub mod scheduler;

pub use cluster::{ClusterSnapshot, EcsCluster};
pub use fleet::EcsClusters;
pub use report::{ClusterReport, RefreshReporter, TracingReporter, VdcReport};
pub use scheduler::{start_refresh_config, ShutdownSignal};
