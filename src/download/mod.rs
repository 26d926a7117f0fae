pub mod cds_client;
pub mod error;
