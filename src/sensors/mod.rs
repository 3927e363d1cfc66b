pub mod service;

pub use service::{SensorHistory, SensorService};
