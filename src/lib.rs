//! # club-edge
//!
//! 会员俱乐部单页应用的边缘进程：
//! - 从固定目录提供前端构建产物
//! - 为每个响应附加 Content-Security-Policy 及配套安全头
//! - 把 `/v1` 请求反向代理到上游 API，并转发白名单内的 Cloudflare 客户端头
//!
//! 进程内唯一的共享状态是启动时构造的不可变 [`config::Config`]。

pub mod app;
pub mod config;
pub mod core;
pub mod infrastructure;
pub mod server;

pub use config::{Config, ConfigError};
pub use crate::core::error::{CoreError, EdgeError};
pub use server::{build_router, run};
