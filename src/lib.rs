pub mod config;
pub mod http;
pub mod ingest;
pub mod storage;
