use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub fn next() -> Self {
        Self(NEXT_WINDOW_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// Reading another window's location across origins is refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("blocked a frame from accessing a cross-origin frame")]
pub struct SecurityError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TargetOrigin {
    Any,
    Exact(String),
}

impl From<TargetOrigin> for String {
    fn from(origin: TargetOrigin) -> Self {
        origin.to_string()
    }
}

impl From<String> for TargetOrigin {
    fn from(origin: String) -> Self {
        if origin == "*" {
            TargetOrigin::Any
        } else {
            TargetOrigin::Exact(origin)
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOrigin::Any => f.write_str("*"),
            TargetOrigin::Exact(origin) => f.write_str(origin),
        }
    }
}

/// A message handed to `postMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedMessage {
    pub target_origin: TargetOrigin,
    pub message: Value,
}

/// A browsing context that can send or receive messages.
pub trait Window {
    fn id(&self) -> WindowId;

    /// `location.pathname`, which fails when the window is cross-origin.
    fn location_path(&self) -> Result<String, SecurityError>;

    fn post_message(&self, message: Value, target_origin: TargetOrigin);
}

/// Window whose outgoing messages land on an unbounded channel.
pub struct ChannelWindow {
    id: WindowId,
    path: Option<String>,
    outbox: mpsc::UnboundedSender<PostedMessage>,
}

impl ChannelWindow {
    /// Same-origin window at `path`.
    pub fn same_origin(path: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        Self::build(Some(path.into()))
    }

    /// Window whose location cannot be read.
    pub fn cross_origin() -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        Self::build(None)
    }

    fn build(path: Option<String>) -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (
            Self {
                id: WindowId::next(),
                path,
                outbox,
            },
            inbox,
        )
    }
}

impl Window for ChannelWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn location_path(&self) -> Result<String, SecurityError> {
        self.path.clone().ok_or(SecurityError)
    }

    fn post_message(&self, message: Value, target_origin: TargetOrigin) {
        if self
            .outbox
            .send(PostedMessage {
                target_origin,
                message,
            })
            .is_err()
        {
            tracing::debug!(target = "relay", window = ?self.id, "window closed; message dropped");
        }
    }
}
