//! Data acquisition for clawmon: running the gateway CLI locally or over ssh, following its
//! log stream, caching status and health snapshots, and switching between instances. A
//! simulated gateway stands in for all of it when no CLI is installed.

pub mod adapter;
pub mod coordinator;
pub mod error;
pub mod follower;
pub mod mock;
pub mod runner;
pub mod scheduler;

pub use adapter::{StatusAdapter, StatusOutcome, HEALTH_ARGS, STATUS_ARGS};
pub use coordinator::{ConnectionState, DashboardView, InstanceCoordinator, Notification};
pub use error::{FailureKind, GatewayError, UnknownInstance};
pub use follower::{FollowSession, FollowState, LogFollower, FOLLOW_ARGS};
pub use mock::MockGateway;
pub use runner::{cli_available, ssh_available, which_cmd, CommandRunner};
pub use scheduler::RefreshScheduler;
