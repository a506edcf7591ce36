pub mod confidence;
pub mod config;
mod cors;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod telemetry;
pub mod upstream;

pub use gateway::{app, GatewayState};
