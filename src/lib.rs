pub mod chat;
pub mod chunker;
pub mod core;
pub mod embeddings;
pub mod llm;
pub mod logging;
pub mod queue;
pub mod search;
pub mod server;
pub mod state;
pub mod store;
pub mod workers;
