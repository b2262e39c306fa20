//! Inbound interfaces that feed provisioning data into the stores.

pub mod csv;
