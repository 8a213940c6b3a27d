//! Data types shared by the storage client and the export adapters.
//!
//! Credentials and content settings are process-wide constants set at
//! startup; blob properties and receipts are transient, one per call.

pub mod blob;
pub mod content_settings;
pub mod credentials;
pub mod metadata;
