use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::message::{override_timeout_reply, OverrideRequest};
use super::window::{TargetOrigin, Window};
use crate::dom::{DomError, DomNode};
use crate::player::ReplayPlayer;
use crate::resolver::{BoundedResolver, ResolveError};

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("failed to resolve override target: {0}")]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    Applied,
    TimedOut,
    Cancelled,
}

/// One `overrideElementAttribute` command: wait for the selector to appear
/// inside the archived page, then write the attribute.
pub struct AttributeOverride<N> {
    pub reply_origin: String,
    pub player: ReplayPlayer<N>,
    pub parent: Rc<dyn Window>,
    pub identity: Rc<str>,
    pub resolver: BoundedResolver,
    pub cancel: CancellationToken,
    pub request: OverrideRequest,
    /// Echoed back verbatim when the target never shows up.
    pub raw_request: Value,
}

impl<N: DomNode> AttributeOverride<N> {
    pub async fn run(self) -> Result<OverrideOutcome, OverrideError> {
        let player = &self.player;
        let selector = self.request.selector.as_str();
        let lookup = || player.find_in_replay(selector);

        match self.resolver.resolve_with_cancel(lookup, &self.cancel).await {
            Ok(target) => {
                target.set_attribute(
                    &self.request.attribute_name,
                    &self.request.attribute_contents,
                );
                tracing::debug!(
                    target = "relay",
                    selector,
                    attribute = %self.request.attribute_name,
                    "attribute override applied"
                );
                Ok(OverrideOutcome::Applied)
            }
            Err(ResolveError::Timeout { attempts }) => {
                tracing::info!(
                    target = "relay",
                    selector,
                    attempts,
                    "attribute override timed out"
                );
                self.parent.post_message(
                    override_timeout_reply(&self.raw_request, &self.identity),
                    TargetOrigin::Exact(self.reply_origin.clone()),
                );
                Ok(OverrideOutcome::TimedOut)
            }
            Err(ResolveError::Cancelled) => Ok(OverrideOutcome::Cancelled),
            Err(ResolveError::Lookup(err)) => Err(err.into()),
        }
    }
}
