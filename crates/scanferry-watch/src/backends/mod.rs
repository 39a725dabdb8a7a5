//! Directory event source implementations.

mod channel_backend;
mod notify_backend;

pub use channel_backend::{ChannelEventSource, EventInjector};
pub use notify_backend::NotifyEventSource;
