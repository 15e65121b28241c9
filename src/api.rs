pub mod audit;
pub mod client;
pub mod heartbeat;
pub mod home_assistant;
pub mod provider;
pub mod telemetry;
pub mod tibber;
pub mod transport;
