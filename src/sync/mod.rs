//! Completion Signals
//!
//! - [`Fence`]: one GPU completion point, polled and never blocked on
//! - [`FenceLedger`]: the outstanding fences of one command stream
//! - [`CompletionLatch`]: a "true only once" latch for stage completion
//!
//! A fence is only ever polled through the ledger of the stream that
//! submitted it, on the thread that drives that stream. Every other
//! observer reads the cached [`Fence::is_signaled`] flag.

mod fence;
mod latch;
mod ledger;

pub use fence::Fence;
pub use latch::CompletionLatch;
pub use ledger::FenceLedger;
