//! 代理处理器

use axum::{
    extract::{Request, State},
    response::Response,
};

use super::service::UpstreamService;
use crate::core::error::CoreError;

#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamService,
}

/// `/v1` 和 `/v1/**` 的任意方法
pub async fn proxy_request(
    State(state): State<AppState>,
    req: Request,
) -> Result<Response, CoreError> {
    state.upstream.forward(req).await
}
