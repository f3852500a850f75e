//! 上游转发服务

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{header, HeaderMap, HeaderName, Uri},
    response::Response,
};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::Config,
    core::{
        error::{CoreError, EdgeError},
        forwarding::{apply_patch, forwarded_header_patch},
    },
    infrastructure::upstream::build_client,
};

/// 逐跳头，不在代理两端之间传递
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Clone)]
pub struct UpstreamService {
    client: Client,
    base: Url,
    allow_list: Arc<[HeaderName]>,
}

impl UpstreamService {
    pub fn new(config: &Config) -> Result<Self, EdgeError> {
        Ok(Self::with_client(
            build_client(config)?,
            config.backend_url.clone(),
            config.forward_headers.clone(),
        ))
    }

    pub fn with_client(client: Client, base: Url, allow_list: Vec<HeaderName>) -> Self {
        Self {
            client,
            base,
            allow_list: allow_list.into(),
        }
    }

    /// 上游地址 + 原始路径和查询参数
    ///
    /// 含 `.` 或 `..` 段的路径直接拒绝，URL 解析会把它们折叠掉，
    /// 转发出去的路径就可能跑到 `/v1` 之外。
    pub fn target_url(&self, uri: &Uri) -> Result<Url, CoreError> {
        if has_dot_segment(uri.path()) {
            return Err(CoreError::BadRequest(format!(
                "请求路径不能包含 . 或 .. 段: {}",
                uri.path()
            )));
        }

        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let base = self.base.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path_and_query}"))
            .map_err(|e| CoreError::BadRequest(format!("无法构造上游地址: {e}")))
    }

    /// 转发请求并把上游响应原样返回
    pub async fn forward(&self, req: Request) -> Result<Response, CoreError> {
        let (parts, body) = req.into_parts();
        let target = self.target_url(&parts.uri)?;

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        apply_patch(
            &mut headers,
            forwarded_header_patch(&parts.headers, &self.allow_list),
        );

        debug!(method = %parts.method, target = %target, "转发到上游");

        let mut outbound = self
            .client
            .request(parts.method.clone(), target.clone())
            .headers(headers);
        // 没有请求体时不要发出空的分块请求体
        if !body.is_end_stream() {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = outbound
            .send()
            .await
            .map_err(|e| {
                warn!(method = %parts.method, target = %target, error = %e, "上游请求失败");
                if e.is_timeout() {
                    CoreError::GatewayTimeout(format!("上游响应超时: {target}"))
                } else {
                    CoreError::BadGateway(format!("上游不可达: {target}"))
                }
            })?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;

        Ok(response)
    }
}

/// 按 `/` 分段，`%2e` 解码后判断
fn has_dot_segment(path: &str) -> bool {
    path.split(|c: char| c == '/' || c == '\\').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection 头里列出的名字同样是逐跳的
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
