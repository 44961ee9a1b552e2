//! Bot module - dispatch, outbound sends and the event feed.

pub mod dispatcher;
mod recent;
mod runtime;
mod sender;
mod updates;
pub mod webhook;

pub use dispatcher::{Handler, Stores};
pub use runtime::run;
pub use sender::SendError;
