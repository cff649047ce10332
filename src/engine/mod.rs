//! Monitoring core: the periodic engine plus the pure pieces it drives.

pub mod alert_policy;
pub mod history;
pub mod hub;
pub mod monitor;
pub mod statistics;

pub use hub::ChannelSubscriber;
pub use monitor::MonitorEngine;
