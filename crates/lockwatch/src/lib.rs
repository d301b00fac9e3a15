pub mod cycle;
pub mod events;
pub mod heartbeat;
pub mod scheduler;
pub mod tracker;
pub mod watchdog;

pub use cycle::{CheckCycle, CycleReport};
pub use events::{EventSink, WatchdogEvent};
pub use heartbeat::HeartbeatRegistry;
pub use scheduler::SchedulerLoop;
pub use tracker::StalenessTracker;
pub use watchdog::Watchdog;

pub use lockwatch_core::{
    KeyValueGateway, LockKey, LockMetadata, Result, WatchdogConfig, WatchdogError,
};
