//! Reconnection policy for the helper connection.
//!
//! When a request finds the connection down, the bridge closes whatever is
//! left and reopens with the last-known parameters. A [`ReconnectionStrategy`]
//! decides how many times it tries and how long it waits in between.
//!
//! # Available Strategies
//!
//! - [`FixedDelay`]: a constant delay between a bounded or unbounded number of attempts
//! - [`NoReconnect`]: never reopens on its own
//!
//! The bridge defaults to [`FixedDelay::single_attempt`]: one immediate attempt
//! per request that finds the connection closed.
//!
//! # Examples
//!
//! ```
//! use helper_bridge::reconnection::FixedDelay;
//! use std::time::Duration;
//!
//! let strategy = FixedDelay::builder()
//!     .delay(Duration::from_millis(250))
//!     .max_attempts(Some(3))
//!     .build();
//! ```
//!
//! ## Disabling Reconnection
//!
//! ```
//! use helper_bridge::reconnection::NoReconnect;
//!
//! let strategy = NoReconnect::new();
//! ```

mod fixed;
mod no_reconnect;
mod traits;

pub use fixed::{FixedDelay, FixedDelayBuilder};
pub use no_reconnect::NoReconnect;
pub use traits::{ReopenHistory, ReconnectionStrategy};
