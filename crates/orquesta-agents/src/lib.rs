//! Agent registry, invocation adapter, and built-in demonstration agents.

pub mod builtin;
pub mod invoker;
pub mod registry;

pub use builtin::{
    register_builtins, DatabaseAgent, DesktopAgent, FallbackAgent, NewsAgent, SummaryAgent,
};
pub use invoker::{error_code, AgentInvoker, ERR_AGENT, ERR_TIMEOUT};
pub use registry::AgentRegistry;
