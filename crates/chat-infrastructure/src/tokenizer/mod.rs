//! Token counting adapters

pub mod tiktoken_counter;

pub use tiktoken_counter::TiktokenCounter;
