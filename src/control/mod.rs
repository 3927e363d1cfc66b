pub mod service;

pub use service::{MqttPublisher, PumpCommand, PumpControl};
