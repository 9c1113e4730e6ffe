// ============================================================================
// Chat Core - Chat Completion Service
// File: crates/chat-core/src/services/chat_completion.rs
// Description: Drives one request/response cycle against the LLM provider
// ============================================================================
//! Completion orchestrator.
//!
//! Each call owns its [`Chat`] for the whole cycle:
//! resolve -> admit user message -> provider -> finalize reply -> re-trim ->
//! persist once. Any failure before persistence leaves the store untouched.

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use validator::Validate;

use super::context_trimmer::ContextTrimmer;
use super::dto::{ChatCompletionInput, ChatCompletionOutput, ChatStreamChunk, CompletionStage};
use crate::domain::{Chat, Message, Role};
use crate::error::DomainError;
use crate::providers::{CompletionProvider, CompletionRequest, TokenCounter};
use crate::repositories::ChatRepository;

/// How long a live but slow consumer gets to take the terminal chunk
const TERMINAL_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat completion service (blocking and streaming)
pub struct ChatCompletionService {
    repository: Arc<dyn ChatRepository>,
    provider: Arc<dyn CompletionProvider>,
    counter: Arc<dyn TokenCounter>,
    trimmer: ContextTrimmer,
}

/// Chat loaded or created for this cycle
struct ResolvedChat {
    chat: Chat,
    is_new: bool,
}

impl ChatCompletionService {
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        provider: Arc<dyn CompletionProvider>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            repository,
            provider,
            counter,
            trimmer: ContextTrimmer::new(),
        }
    }

    /// Blocking completion: wait for the whole reply, then persist
    pub async fn execute(
        &self,
        input: ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, DomainError> {
        let input = input.with_resolved_id();
        let chat_id = input.chat_id.clone();

        let result = self.run_blocking(input, cancel).await;
        if let Err(e) = &result {
            log_failure(&chat_id, e);
        }
        result
    }

    /// Streaming completion.
    ///
    /// Fragments are forwarded to `sink` in arrival order as they come in.
    /// The stream is closed with exactly one terminal chunk: `Done` after the
    /// reply was persisted, or `Error`. The sender is dropped on return.
    pub async fn execute_stream(
        &self,
        input: ChatCompletionInput,
        sink: mpsc::Sender<ChatStreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, DomainError> {
        let input = input.with_resolved_id();
        let chat_id = input.chat_id.clone();
        let user_id = input.user_id.clone();

        let result = self.run_streaming(input, &sink, cancel).await;
        let terminal = match &result {
            Ok(output) => ChatStreamChunk::Done {
                chat_id: output.chat_id.clone(),
                user_id: output.user_id.clone(),
                message_id: output.message_id,
            },
            Err(e) => {
                log_failure(&chat_id, e);
                ChatStreamChunk::error(&chat_id, &user_id, e)
            }
        };
        send_terminal(&sink, &chat_id, terminal).await;
        result
    }

    /// End a chat so later requests fail with `ChatEnded`. Ending an
    /// already ended chat succeeds without a write.
    pub async fn end_chat(
        &self,
        chat_id: &str,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        let existing = run_cancellable(cancel, self.repository.find_by_id(chat_id)).await?;
        let mut chat = match existing {
            Some(chat) if chat.user_id() == user_id => chat,
            _ => {
                warn!("End requested for unknown chat {} by user {}", chat_id, user_id);
                return Err(DomainError::ChatNotFound(chat_id.to_string()));
            }
        };

        if !chat.is_active() {
            debug!("Chat {} already ended", chat_id);
            return Ok(());
        }

        chat.end();
        self.repository.save(&chat).await?;
        info!("Chat {} ended by user {}", chat_id, user_id);
        Ok(())
    }

    async fn run_blocking(
        &self,
        input: ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, DomainError> {
        let user_id = input.user_id.clone();
        let ResolvedChat { mut chat, is_new } = self.prepare(input, cancel).await?;

        stage(chat.id(), CompletionStage::CallingProvider);
        let request = CompletionRequest::from_chat(&chat);
        let content = run_cancellable(cancel, self.provider.complete(request)).await?;

        let reply = self.finalize(&mut chat, content)?;
        self.persist(&chat, is_new).await?;

        stage(chat.id(), CompletionStage::Done);
        Ok(ChatCompletionOutput {
            chat_id: chat.id().to_string(),
            user_id,
            message_id: reply.id(),
            content: reply.content().to_string(),
        })
    }

    async fn run_streaming(
        &self,
        input: ChatCompletionInput,
        sink: &mpsc::Sender<ChatStreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, DomainError> {
        let user_id = input.user_id.clone();
        let ResolvedChat { mut chat, is_new } = self.prepare(input, cancel).await?;

        stage(chat.id(), CompletionStage::CallingProvider);
        let request = CompletionRequest::from_chat(&chat);
        let mut fragments =
            run_cancellable(cancel, self.provider.complete_stream(request)).await?;

        stage(chat.id(), CompletionStage::StreamingFragments);
        let mut buffer = String::new();
        let mut forwarded = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DomainError::Cancelled),
                item = fragments.next() => item,
            };
            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => return Err(e),
                None => break,
            };
            if fragment.is_empty() {
                continue;
            }

            buffer.push_str(&fragment);
            let chunk = ChatStreamChunk::Message {
                chat_id: chat.id().to_string(),
                user_id: user_id.clone(),
                content: fragment,
            };
            // Bounded channel: wait for capacity, never drop a fragment
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DomainError::Cancelled),
                sent = sink.send(chunk) => {
                    if sent.is_err() {
                        warn!("Stream consumer for chat {} went away", chat.id());
                        return Err(DomainError::Cancelled);
                    }
                }
            }
            forwarded += 1;
        }
        debug!("Chat {}: forwarded {} fragment(s)", chat.id(), forwarded);

        let reply = self.finalize(&mut chat, buffer)?;
        self.persist(&chat, is_new).await?;

        stage(chat.id(), CompletionStage::Done);
        Ok(ChatCompletionOutput {
            chat_id: chat.id().to_string(),
            user_id,
            message_id: reply.id(),
            content: reply.content().to_string(),
        })
    }

    /// Validate, resolve the chat and admit the user message
    async fn prepare(
        &self,
        input: ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ResolvedChat, DomainError> {
        input.validate()?;

        stage(&input.chat_id, CompletionStage::Resolving);
        let mut resolved = self.resolve(&input, cancel).await?;

        stage(&input.chat_id, CompletionStage::TrimmingPre);
        let chat = &mut resolved.chat;
        let user_message = Message::new(
            Role::User,
            input.user_message,
            &chat.config().model,
            self.counter.as_ref(),
        )?;
        self.trimmer.admit(chat, user_message)?;

        Ok(resolved)
    }

    async fn resolve(
        &self,
        input: &ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ResolvedChat, DomainError> {
        let existing =
            run_cancellable(cancel, self.repository.find_by_id(&input.chat_id)).await?;

        match existing {
            Some(chat) => {
                if chat.user_id() != input.user_id {
                    warn!(
                        "Chat {} requested by user {} but owned by another user",
                        input.chat_id, input.user_id
                    );
                    return Err(DomainError::ChatNotFound(input.chat_id.clone()));
                }
                debug!("Loaded chat {} ({} tokens)", chat.id(), chat.token_usage());
                Ok(ResolvedChat { chat, is_new: false })
            }
            None if input.continue_existing => {
                warn!("Chat {} not found", input.chat_id);
                Err(DomainError::ChatNotFound(input.chat_id.clone()))
            }
            None => {
                let config = input.config.chat.clone();
                let system = Message::new(
                    Role::System,
                    input.config.initial_system_message.clone(),
                    &config.model,
                    self.counter.as_ref(),
                )?;
                let chat = Chat::new(input.chat_id.clone(), input.user_id.clone(), system, config)?;
                info!("Opened new chat {} for user {}", chat.id(), chat.user_id());
                Ok(ResolvedChat { chat, is_new: true })
            }
        }
    }

    /// Wrap the provider output as the assistant message, append it and re-trim
    fn finalize(&self, chat: &mut Chat, content: String) -> Result<Message, DomainError> {
        stage(chat.id(), CompletionStage::Finalizing);
        if content.is_empty() {
            return Err(DomainError::Provider("provider returned an empty completion".to_string()));
        }
        let reply = Message::new(
            Role::Assistant,
            content,
            &chat.config().model,
            self.counter.as_ref(),
        )?;

        stage(chat.id(), CompletionStage::TrimmingPost);
        self.trimmer.append(chat, reply.clone())?;
        Ok(reply)
    }

    /// Single store write per cycle. Not raced against cancellation.
    async fn persist(&self, chat: &Chat, is_new: bool) -> Result<(), DomainError> {
        stage(chat.id(), CompletionStage::Persisting);
        let result = if is_new {
            self.repository.create(chat).await
        } else {
            self.repository.save(chat).await
        };

        match result {
            Ok(()) => {
                info!(
                    "Chat {} saved: {} active, {} erased, {}/{} tokens",
                    chat.id(),
                    chat.messages().len(),
                    chat.erased_messages().len(),
                    chat.token_usage(),
                    chat.config().model.max_tokens()
                );
                Ok(())
            }
            Err(e) => {
                error!("Reply for chat {} generated but not saved: {}", chat.id(), e);
                Err(e)
            }
        }
    }
}

/// Await `fut` unless the request is cancelled first
async fn run_cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DomainError::Cancelled),
        result = fut => result,
    }
}

/// Deliver the closing `Done`/`Error` chunk. Waits for channel capacity so
/// the marker is never dropped behind unread fragments; a closed receiver
/// or a consumer stalled past the timeout gets nothing.
async fn send_terminal(
    sink: &mpsc::Sender<ChatStreamChunk>,
    chat_id: &str,
    chunk: ChatStreamChunk,
) {
    match tokio::time::timeout(TERMINAL_CHUNK_TIMEOUT, sink.send(chunk)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => debug!("Stream receiver for chat {} closed before the terminal chunk", chat_id),
        Err(_) => warn!(
            "Stream consumer for chat {} did not take the terminal chunk within {:?}",
            chat_id, TERMINAL_CHUNK_TIMEOUT
        ),
    }
}

fn stage(chat_id: &str, stage: CompletionStage) {
    debug!(chat_id = %chat_id, stage = %stage, "completion stage");
}

fn log_failure(chat_id: &str, err: &DomainError) {
    stage(chat_id, CompletionStage::Failed);
    match err {
        DomainError::Cancelled => info!("Completion for chat {} cancelled", chat_id),
        e => warn!("Completion for chat {} failed: {}", chat_id, e),
    }
}
