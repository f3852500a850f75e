//! 客户端标识头白名单转发
//!
//! Cloudflare 在边缘为每个请求附加客户端 IP、国家等信息。
//! 代理到上游时只复制白名单中的头，其余一律不做补全。

use axum::http::{HeaderMap, HeaderName};

/// 默认转发的头
pub const DEFAULT_FORWARD_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "cf-connecting-ipv6",
    "cf-ipcountry",
    "cf-ray",
    "cf-visitor",
    "true-client-ip",
];

/// 计算需要写入上游请求的头
///
/// 白名单中存在于入站请求的头按原值复制（包括多值）；
/// 入站请求中没有的头直接省略。
pub fn forwarded_header_patch(inbound: &HeaderMap, allow_list: &[HeaderName]) -> HeaderMap {
    let mut patch = HeaderMap::new();

    for name in allow_list {
        for value in inbound.get_all(name) {
            patch.append(name.clone(), value.clone());
        }
    }

    patch
}

/// 把补丁写入出站请求头，同名的旧值会被替换
pub fn apply_patch(outbound: &mut HeaderMap, patch: HeaderMap) {
    let mut current: Option<HeaderName> = None;

    // HeaderMap::into_iter 只在每组的第一个值上给出名字
    for (name, value) in patch {
        if let Some(name) = name {
            outbound.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            outbound.append(name.clone(), value);
        }
    }
}
