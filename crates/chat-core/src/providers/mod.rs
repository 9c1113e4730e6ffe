//! Ports to external collaborators: the LLM provider and the token codec

pub mod completion;
pub mod tokenizer;

pub use completion::{CompletionProvider, CompletionRequest, FragmentStream, PromptMessage};
pub use tokenizer::TokenCounter;
