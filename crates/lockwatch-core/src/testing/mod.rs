//! Testing utilities for watchdog integrations.
//!
//! This module provides an in-memory [`KeyValueGateway`] implementation so
//! watchdog behavior can be exercised without a running store:
//! - Seed counters, metadata, and resource keys before a cycle
//! - Inspect surviving state and the operations the watchdog applied
//! - Inject one-shot store failures to drive error paths
//!
//! The gateway is available to downstream crates behind the `testing`
//! feature, and to this workspace's own unit tests unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use lockwatch_core::testing::MemoryGateway;
//!
//! #[tokio::test]
//! async fn test_counter_increment() {
//!     let gateway = MemoryGateway::new();
//!     gateway.seed_hash_field("redlock_list", "lock:report", "4");
//!
//!     let value = gateway
//!         .hash_increment_by("redlock_list", "lock:report", 1)
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(value, 5);
//! }
//! ```
//!
//! [`KeyValueGateway`]: crate::gateway::KeyValueGateway

pub mod memory_gateway;

pub use memory_gateway::{MemoryGateway, OpKind, RecordedOp};
