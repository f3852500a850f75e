//! 核心错误处理模块

use std::{io, net::SocketAddr};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// 启动和运行阶段的错误，全部是致命错误
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("无法创建上游 HTTP 客户端: {0}")]
    UpstreamClient(#[from] reqwest::Error),

    #[error("安全响应头无效: {0}")]
    InvalidSecurityHeader(String),

    #[error("无法绑定到 {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("服务器运行失败: {0}")]
    Serve(#[source] io::Error),
}

/// 单个请求的错误，转换为 HTTP 响应
#[derive(Debug)]
pub enum CoreError {
    BadRequest(String),
    BadGateway(String),
    GatewayTimeout(String),
}

/// 错误响应结构
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    pub timestamp: String,
    pub request_id: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_message, user_message) = match self {
            CoreError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            CoreError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", msg),
            CoreError::GatewayTimeout(msg) => {
                (StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_message.to_string(),
            message: user_message,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: uuid::Uuid::new_v4().to_string(),
        };

        (status, axum::Json(error_response)).into_response()
    }
}
