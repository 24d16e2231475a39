pub mod agent;
pub mod core;
pub mod crawl;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
pub mod vector_math;

#[cfg(test)]
mod testing;
