//! Domain services: context trimming and completion orchestration

pub mod chat_completion;
pub mod context_trimmer;
pub mod dto;

pub use chat_completion::ChatCompletionService;
pub use context_trimmer::ContextTrimmer;
pub use dto::{
    ChatCompletionConfig, ChatCompletionInput, ChatCompletionOutput, ChatStreamChunk,
    CompletionStage,
};
