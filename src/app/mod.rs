//! 应用层：`/v1` 代理和静态资源

pub mod assets;
pub mod proxy;
