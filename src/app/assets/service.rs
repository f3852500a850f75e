//! 静态资源服务

use std::path::Path;

use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tracing::warn;

/// 把静态目录挂到路由的兜底位置
///
/// 未命中的路径默认返回 404；开启 `spa_fallback` 后返回 `index.html`（状态码 200）。
pub fn mount(router: Router, public_dir: &Path, spa_fallback: bool) -> Router {
    if !public_dir.is_dir() {
        warn!(dir = %public_dir.display(), "静态资源目录不存在，所有静态请求将返回 404");
    }

    let serve_dir = ServeDir::new(public_dir);

    if spa_fallback {
        let index = ServeFile::new(public_dir.join("index.html"));
        router.fallback_service(serve_dir.fallback(index))
    } else {
        router.fallback_service(serve_dir)
    }
}
