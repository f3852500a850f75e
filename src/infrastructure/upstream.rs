//! 上游 HTTP 客户端

use reqwest::{redirect, Client, ClientBuilder};
use tracing::{info, warn};

use crate::{config::Config, core::error::EdgeError};

/// 上游证书校验策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVerification {
    /// 默认，校验上游证书
    Verify,
    /// 只有 `UPSTREAM_INSECURE_TLS` 显式开启时才会出现
    AcceptInvalidCerts,
}

impl TlsVerification {
    pub fn from_config(config: &Config) -> Self {
        if config.upstream_insecure_tls {
            Self::AcceptInvalidCerts
        } else {
            Self::Verify
        }
    }

    pub fn accepts_invalid_certs(self) -> bool {
        matches!(self, Self::AcceptInvalidCerts)
    }
}

/// 按配置准备客户端构建器
///
/// 不跟随重定向，也不自动解压，上游响应原样交给浏览器。
pub fn client_builder(config: &Config) -> ClientBuilder {
    let tls = TlsVerification::from_config(config);
    if tls.accepts_invalid_certs() {
        warn!(
            backend = %config.backend_url,
            "UPSTREAM_INSECURE_TLS 已开启，不校验上游 TLS 证书"
        );
    }

    let mut builder = Client::builder()
        .redirect(redirect::Policy::none())
        .danger_accept_invalid_certs(tls.accepts_invalid_certs());

    if let Some(timeout) = config.upstream_timeout {
        info!(timeout_ms = timeout.as_millis() as u64, "上游请求超时已设置");
        builder = builder.timeout(timeout);
    }

    builder
}

/// 构建转发用的客户端
pub fn build_client(config: &Config) -> Result<Client, EdgeError> {
    Ok(client_builder(config).build()?)
}
