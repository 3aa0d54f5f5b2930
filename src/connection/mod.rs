//! Connection lifecycle: handshake, retry with linear backoff, teardown.
//!
//! One driver task runs per connect sequence. It owns the handshake loop
//! and, once connected, reads the channel and dispatches every inbound event
//! to the [`ChannelHandler`] in delivery order.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!                                 │                  │ remote close
//!                               error                ▼
//!                                 ▼            Disconnected (or Retrying
//!                             Retrying ─▶ ...   with auto_reconnect)
//!                                 │
//!                        max_retries reached
//!                                 ▼
//!                               Failed
//! ```
//!
//! Concurrent `connect()` calls share one pending outcome; `disconnect()`
//! cancels whatever is running and resolves that outcome as aborted.

mod manager;

pub use manager::{ChannelHandler, ConnectionManager};
