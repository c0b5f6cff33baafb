//! The tick replayer (one source per stream) and the scheduler that merges
//! all of them into a single virtual clock.

pub mod replayer;
pub mod scheduler;

pub use replayer::TickReplayer;
pub use scheduler::{EventSink, ReplayScheduler};
