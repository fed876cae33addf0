//! The slice of the DOM the relay needs to reach into the player.
//!
//! Every traversal step returns `Option`: a missing shadow root, iframe
//! document or element is an ordinary "not there yet" answer, never an
//! error. `DomError` is reserved for failures that retrying cannot fix.

mod realm;

use serde_json::Value;
use thiserror::Error;

pub use realm::{Element, Realm};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("invalid tag name: {0}")]
    InvalidTagName(String),
}

/// A handle to a node that can be cloned cheaply and outlives the call that
/// produced it.
pub trait DomNode: Clone + 'static {
    /// The open shadow root attached to this element, if any.
    fn shadow_root(&self) -> Option<Self>;

    /// The document loaded inside this iframe element, if any.
    fn content_document(&self) -> Option<Self>;

    /// First descendant matching `selector`, in document order.
    fn query_selector(&self, selector: &str) -> Result<Option<Self>, DomError>;

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    /// Script-visible expando property (`element.__inited` and friends).
    fn property(&self, name: &str) -> Option<Value>;
}

/// `querySelector` followed by `shadowRoot`, the most common hop when walking
/// into nested custom elements.
pub fn shadow_of<N: DomNode>(scope: &N, selector: &str) -> Result<Option<N>, DomError> {
    Ok(scope
        .query_selector(selector)?
        .and_then(|host| host.shadow_root()))
}

/// `querySelector` followed by `contentDocument`.
pub fn frame_document_of<N: DomNode>(scope: &N, selector: &str) -> Result<Option<N>, DomError> {
    Ok(scope
        .query_selector(selector)?
        .and_then(|frame| frame.content_document()))
}
