//! Pub/sub output channel for converted images.
//!
//! The downstream transport is fire-and-forget from the acquisition loop's
//! perspective: a publish never blocks and never fails the session, even
//! with no subscriber attached.

use crate::frame::ConvertedImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Publication boundary the acquisition loop hands images to.
pub trait FramePublisher: Send + Sync {
    /// Publish one image on the node's output channel.
    fn publish(&self, image: ConvertedImage);

    /// Name of the output channel, fixed per process.
    fn channel(&self) -> &str;
}

/// Message delivered to channel subscribers.
#[derive(Debug, Clone)]
pub struct ImageMessage {
    /// Channel the image was published under
    pub channel: Arc<str>,
    pub image: ConvertedImage,
}

/// Broadcast-backed output channel.
pub struct OutputChannel {
    name: Arc<str>,
    sender: broadcast::Sender<ImageMessage>,
    published: AtomicU64,
}

impl OutputChannel {
    /// Create a named channel buffering up to `capacity` messages per
    /// subscriber.
    pub fn new(name: &str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            name: Arc::from(name),
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to the channel and get a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ImageMessage> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total images published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl FramePublisher for OutputChannel {
    fn publish(&self, image: ConvertedImage) {
        let message = ImageMessage {
            channel: Arc::clone(&self.name),
            image,
        };

        // A send with no subscribers returns Err; that is not a failure of
        // the publisher.
        match self.sender.send(message) {
            Ok(receivers) => {
                trace!(
                    channel = %self.name,
                    receivers,
                    "Published image"
                );
            }
            Err(_) => {
                trace!(channel = %self.name, "Published image with no subscribers");
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    fn channel(&self) -> &str {
        &self.name
    }
}

impl Clone for OutputChannel {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
            published: AtomicU64::new(self.published.load(Ordering::Relaxed)),
        }
    }
}
