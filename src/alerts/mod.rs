//! Alert/monitor engine
//!
//! Periodic evaluation of user-declared conditions with trigger-once
//! semantics and channel-delivered notifications.

pub mod engine;
pub mod types;

pub use engine::{AlertEngine, AlertNotification};
pub use types::{Alert, AlertCondition, AlertStats, PriceOp};
