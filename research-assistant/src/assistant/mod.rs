pub mod configuration;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod search;
pub mod state;
