//! The persistent-worker side: reply framing and the process
//! supervisor that multiplexes concurrent callers onto one worker.

mod framer;
mod supervisor;

#[cfg(test)]
pub(crate) mod test_stream;

pub use framer::{ReplyFramer, READY_SENTINEL};
pub use supervisor::{PendingReply, RawReply, Supervisor};
