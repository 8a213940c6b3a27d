//! Storage-facing services: request signing, SAS minting, the Blob client
//! and the bounded pool export calls run on.

pub mod auth;
pub mod azure_client;
pub mod exporter;
pub mod sas;
pub mod worker_pool;
