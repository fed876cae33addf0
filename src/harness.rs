//! Line-oriented stand-in for the browser's message plumbing, used by the
//! `replay-embed` binary. Each input line names which window sent the
//! message; every `postMessage` to the parent comes back out as one line.

use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::relay::{ChannelWindow, MessageEvent, PostedMessage, Window};

#[derive(Debug, Error)]
pub enum HarnessInputError {
    #[error("invalid input line: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The page embedding us.
    Parent,
    /// The player's service-worker frame.
    Replay,
    /// Any other, cross-origin window.
    Foreign,
}

#[derive(Debug, Deserialize)]
pub struct InputLine {
    pub from: Sender,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub data: Value,
}

pub struct Harness {
    parent: Rc<dyn Window>,
    replay_frame: Rc<dyn Window>,
    foreign: Rc<dyn Window>,
}

impl Harness {
    /// Build the three windows. The returned receiver yields everything
    /// posted to the parent.
    pub fn new(replay_base: &str) -> (Self, UnboundedReceiver<PostedMessage>) {
        let (parent, parent_outbox) = ChannelWindow::cross_origin();
        let (replay_frame, _) = ChannelWindow::same_origin(replay_base);
        let (foreign, _) = ChannelWindow::cross_origin();
        (
            Self {
                parent: Rc::new(parent),
                replay_frame: Rc::new(replay_frame),
                foreign: Rc::new(foreign),
            },
            parent_outbox,
        )
    }

    pub fn parent(&self) -> Rc<dyn Window> {
        Rc::clone(&self.parent)
    }

    pub fn event_for(&self, line: &str) -> Result<MessageEvent, HarnessInputError> {
        let input: InputLine = serde_json::from_str(line)?;
        let source = match input.from {
            Sender::Parent => Rc::clone(&self.parent),
            Sender::Replay => Rc::clone(&self.replay_frame),
            Sender::Foreign => Rc::clone(&self.foreign),
        };
        Ok(MessageEvent::new(source, input.origin, input.data))
    }
}

pub fn render_posted(posted: &PostedMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(posted)
}
