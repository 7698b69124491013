//! Cooperative cancellation shared by every long-running call.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The user stopped the whole run.
    UserAbort,
    /// A time limit ran out.
    Timeout,
    /// The user stopped a single test case; the rest of the run goes on.
    RerunScope,
    /// Killed outright through its process handle, without a soft kill.
    Killed,
}

impl AbortReason {
    pub fn is_user_initiated(self) -> bool {
        matches!(self, AbortReason::UserAbort | AbortReason::RerunScope)
    }
}

/// Cloneable cancellation handle carrying the reason it was triggered with.
///
/// The first reason recorded wins. A child handle is cancelled together with
/// its parent and reports the parent's reason in that case, while cancelling
/// the child leaves the parent untouched.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
    parent: Option<Box<Cancellation>>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: AbortReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        if !self.is_cancelled() {
            return None;
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.reason())
            .or_else(|| self.reason.get().copied())
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
            parent: Some(Box::new(self.clone())),
        }
    }
}
