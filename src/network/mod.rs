pub mod api;
pub mod client;
pub mod normalize;
pub mod socket;

pub use api::RestClient;
pub use client::{ChatClient, GatewaySettings};
