pub mod dispatcher;
pub mod legacy_sse;

pub use dispatcher::mcp_router;
