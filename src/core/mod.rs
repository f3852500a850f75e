//! 核心层：错误、中间件、请求头策略

pub mod error;
pub mod forwarding;
pub mod middleware;
pub mod security;
