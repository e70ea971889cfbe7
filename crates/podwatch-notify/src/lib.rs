//! Webhook notification delivery for podwatch
//!
//! Posts a [`NotificationPayload`] to the return URL supplied with a tick.
//! Delivery is attempted once; there is no retry.

mod dispatcher;
mod error;

pub use dispatcher::{DEFAULT_TIMEOUT, NotificationDispatcher};
pub use error::DispatchError;

pub use podwatch_types::NotificationPayload;
