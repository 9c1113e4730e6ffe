//! LLM provider adapters

pub mod openai_client;

pub use openai_client::OpenAiCompletionProvider;
