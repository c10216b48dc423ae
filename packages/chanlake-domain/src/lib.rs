pub mod detection;
pub mod ingest;
pub mod message;
