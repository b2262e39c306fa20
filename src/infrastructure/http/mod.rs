//! HTTP adapters for the payment gateway and the messaging channel.

pub mod messaging;
pub mod payment_gateway;

use reqwest::Client;
use std::time::Duration;

/// Builds a client whose every request is bounded by `timeout`.
///
/// `accept_invalid_certs` turns off TLS certificate verification. Some
/// messaging deployments run behind self-signed certificates; leave it off
/// anywhere else.
pub fn build_client(timeout: Duration, accept_invalid_certs: bool) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
}
