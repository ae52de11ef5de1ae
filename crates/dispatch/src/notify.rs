//! Best-effort failure notification
//!
//! The dispatcher reports quota exhaustion, permanent failures, and pool
//! exhaustion through a [`Notifier`]. Notification is strictly fire and
//! forget: it never blocks the dispatch path and its own failures are
//! logged and swallowed. [`WebhookNotifier`] queues messages into a bounded
//! channel drained by a detached task that POSTs them as `{"text": ...}`;
//! when the queue is full the message is dropped.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Messages waiting for delivery before new ones are dropped.
const QUEUE_CAPACITY: usize = 64;

/// One-way sink for dispatch failure reports.
pub trait Notifier: Send + Sync {
    /// Deliver `message` on a best-effort basis. Must not block.
    fn notify(&self, message: &str);
}

/// Notifier that discards everything.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _message: &str) {}
}

/// JSON body posted to the webhook endpoint.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Notifier that POSTs messages to a webhook URL from a background task.
pub struct WebhookNotifier {
    tx: mpsc::Sender<String>,
}

impl WebhookNotifier {
    /// Create the notifier and spawn its delivery task.
    ///
    /// The task runs until every clone of the notifier is dropped and the
    /// queue drains.
    pub fn new(client: reqwest::Client, webhook_url: String) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(deliver_loop(client, webhook_url, rx));
        Self { tx }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, message: &str) {
        if self.tx.try_send(message.to_owned()).is_err() {
            debug!("notification dropped (queue full or delivery task gone)");
        }
    }
}

/// Drain queued messages, posting each to the webhook. Delivery failures
/// are logged and the loop moves on.
async fn deliver_loop(client: reqwest::Client, url: String, mut rx: mpsc::Receiver<String>) {
    while let Some(message) = rx.recv().await {
        let payload = WebhookPayload { text: &message };
        match client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "notification webhook rejected message");
            }
            Err(e) => {
                warn!(error = %e, "notification webhook unreachable");
            }
        }
    }
}
