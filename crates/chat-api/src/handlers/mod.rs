//! HTTP handlers

pub mod chat;
pub mod health;
pub mod stream;

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancel `token` once `timeout` elapses. The timer stops early when the
/// token is cancelled by anyone else.
pub(crate) fn spawn_deadline(token: &CancellationToken, timeout: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!("Request deadline of {:?} elapsed", timeout);
                token.cancel();
            }
        }
    });
}
