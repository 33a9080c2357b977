//! Transport back-channel handle.
//!
//! The back-channel is the transport's handle for the reply path of one
//! specific request. The engine closes it independently of the logical
//! response when a reply is handed off for asynchronous delivery, so the
//! transport can reclaim the connection without waiting for that delivery.

use crate::error::HermesError;
use tracing::warn;

/// The reply path of one specific request.
///
/// `close` is best-effort and may be called zero or more times; failures are
/// recorded by the caller (see [`close_back_channel`]) and never propagated.
pub trait BackChannel: Send + Sync {
    /// Closes the reply path, letting the transport reclaim resources.
    ///
    /// Implementations must tolerate repeated calls.
    fn close(&self) -> Result<(), HermesError>;
}

/// Closes a back-channel, logging any failure instead of returning it.
pub fn close_back_channel(channel: &dyn BackChannel) {
    if let Err(error) = channel.close() {
        warn!(%error, "failed to close transport back-channel");
    }
}
