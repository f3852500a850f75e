//! 基础设施层：日志和上游客户端

pub mod logger;
pub mod upstream;
