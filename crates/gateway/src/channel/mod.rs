pub mod registry;

pub use registry::{ChannelRegistry, DEFAULT_CHANNEL};
