pub mod channel_queue;
pub mod queue;

pub use channel_queue::ChannelCommandQueue;
pub use queue::{Command, CommandQueue};
