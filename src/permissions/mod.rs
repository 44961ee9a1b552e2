//! Gating system deciding whether a plugin may act on an event.
//!
//! This module provides the building blocks every plugin's `midware` is
//! made of.
//!
//! ## Features
//!
//! - `Reason` outcomes carrying a code, author and message
//! - `and`/`or`/`not` composition with short-circuiting
//! - Ready-made gates (event kind, self-authored, owner, admin, chat type)
//!
//! ## Usage
//!
//! ```rust
//! let gate = midware_and([
//!     event_is(&[EventName::MessagesUpsert]),
//!     midware_or([from_me(), from_owner()]),
//! ]);
//!
//! if gate(&ctx).success {
//!     // ...
//! }
//! ```

mod checker;
pub mod midware;
mod reason;

pub use checker::Permissions;
pub use midware::{Midware, midware_and, midware_or};
pub use reason::Reason;
