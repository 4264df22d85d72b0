pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod storage;
pub mod time;
