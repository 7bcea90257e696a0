//! Non-blocking hand-off between producers and the publisher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Publisher;
use crate::error::PublishError;

/// A payload addressed to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as UTF-8 text, for logs and tests.
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Sending half of the publish queue.
///
/// Cloning is cheap; all clones feed the same dispatcher.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Message>,
}

impl Outbox {
    /// Create a queue holding at most `capacity` pending messages.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting.
    ///
    /// Fails when the queue is full or the dispatcher has gone away; the
    /// message is dropped in both cases.
    pub fn send(&self, message: Message) -> Result<(), PublishError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(m) => {
                PublishError::Queue(format!("queue full, dropped message for {}", m.topic))
            }
            mpsc::error::TrySendError::Closed(m) => PublishError::Queue(format!(
                "dispatcher closed, dropped message for {}",
                m.topic
            )),
        })
    }
}

/// Spawn the task that drains the queue into the publisher.
///
/// Publish failures are logged and not retried. The task ends once every
/// [`Outbox`] clone has been dropped and the queue is empty.
pub fn spawn_dispatcher(
    publisher: Arc<dyn Publisher>,
    mut rx: mpsc::Receiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match publisher.publish(&message.topic, &message.payload).await {
                Ok(()) => debug!(
                    "Message sent to {}: {}",
                    message.topic,
                    message.payload_str()
                ),
                Err(e) => warn!("Failed to send message to {}: {}", message.topic, e),
            }
        }
        debug!("Dispatcher for {} stopped", publisher.description());
    })
}

/// Wait for the dispatcher to drain its queue, aborting it after `grace`.
///
/// Every [`Outbox`] clone must be dropped first or the wait always runs the
/// full grace period. Returns `true` when the queue was fully drained.
pub async fn finish_dispatcher(mut task: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Dispatcher task failed: {}", e);
            false
        }
        Err(_) => {
            warn!(
                "Dispatcher did not drain within {:?}, dropping the rest",
                grace
            );
            task.abort();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::MemoryPublisher;

    #[tokio::test]
    async fn dispatcher_forwards_in_order() {
        let publisher = Arc::new(MemoryPublisher::new());
        let (outbox, rx) = Outbox::channel(8);
        let task = spawn_dispatcher(publisher.clone(), rx);

        outbox.send(Message::new("a/status", "{}")).unwrap();
        outbox.send(Message::new("a/output", "{\"x\":1}")).unwrap();
        drop(outbox);
        task.await.unwrap();

        let sent = publisher.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].topic, "a/status");
        assert_eq!(sent[1].payload_str(), "{\"x\":1}");
    }

    #[tokio::test]
    async fn finish_delivers_messages_still_queued() {
        let publisher = Arc::new(MemoryPublisher::new());
        let (outbox, rx) = Outbox::channel(8);
        let task = spawn_dispatcher(publisher.clone(), rx);

        outbox.send(Message::new("a/output", "1")).unwrap();
        outbox.send(Message::new("a/output", "2")).unwrap();
        drop(outbox);

        assert!(finish_dispatcher(task, Duration::from_secs(1)).await);
        assert_eq!(publisher.on_topic("a/output").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_gives_up_while_outbox_is_alive() {
        let publisher = Arc::new(MemoryPublisher::new());
        let (outbox, rx) = Outbox::channel(8);
        let task = spawn_dispatcher(publisher, rx);

        assert!(!finish_dispatcher(task, Duration::from_millis(100)).await);
        drop(outbox);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (outbox, _rx) = Outbox::channel(1);
        outbox.send(Message::new("t", "1")).unwrap();
        let err = outbox.send(Message::new("t", "2")).unwrap_err();
        assert!(matches!(err, PublishError::Queue(_)));
    }

    #[tokio::test]
    async fn closed_queue_reports_error() {
        let (outbox, rx) = Outbox::channel(4);
        drop(rx);
        assert!(outbox.send(Message::new("t", "1")).is_err());
    }

    #[tokio::test]
    async fn publish_failures_do_not_stop_dispatcher() {
        let publisher = Arc::new(MemoryPublisher::new());
        publisher.set_connected(false);
        let (outbox, rx) = Outbox::channel(8);
        let task = spawn_dispatcher(publisher.clone(), rx);

        outbox.send(Message::new("t", "dropped")).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        publisher.set_connected(true);
        outbox.send(Message::new("t", "kept")).unwrap();
        drop(outbox);
        task.await.unwrap();

        let sent = publisher.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload_str(), "kept");
    }
}
