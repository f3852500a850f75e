//! 日志基础设施

use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// 初始化全局日志，`RUST_LOG` 优先于默认级别
    ///
    /// 重复调用不会 panic，只保留第一次的设置。
    pub fn init(default_level: Level) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level.to_string().to_ascii_lowercase()));

        if let Err(e) = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
        {
            debug!("全局日志已存在，沿用现有设置: {}", e);
        }
    }
}
