pub mod chat;
pub mod config;
pub mod conversations;
pub mod health;
pub mod ingest;
pub mod jobs;
pub mod search;
