//! Domain models shared across the entire Pricewatch service.

pub mod alert;
pub mod stats;
pub mod tick;

pub use alert::{Alert, AlertKind};
pub use stats::Statistics;
pub use tick::Tick;
