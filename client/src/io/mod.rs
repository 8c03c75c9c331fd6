//! Remote data boundary: transport trait, HTTP implementation, request
//! bodies and the typed API facade.

pub mod api;
pub mod http;
pub mod payloads;
pub mod transport;

#[cfg(test)]
pub mod fake_sheet;

pub use api::SavingsApi;
pub use http::HttpTransport;
pub use transport::Transport;
