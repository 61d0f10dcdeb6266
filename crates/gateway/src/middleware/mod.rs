pub mod channel_binding;

pub use channel_binding::channel_binding;
