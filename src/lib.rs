pub mod config;
pub mod metrics;
pub mod protocol;
pub mod recorder;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server;
pub mod sqlite_store;
pub mod store;
pub mod ws;

#[cfg(test)]
mod recorder_props;

pub use server::GatewayServer;
