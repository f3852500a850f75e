//! 路由装配和服务器生命周期

use std::sync::Arc;

use axum::{middleware, routing::any, Router};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    app::{
        assets,
        proxy::{
            handler::{proxy_request, AppState},
            service::UpstreamService,
        },
    },
    config::Config,
    core::{
        error::EdgeError,
        middleware::request_logging_middleware,
        security::{apply_security_headers, SecurityHeaders},
    },
};

/// 代理前缀
pub const PROXY_PREFIX: &str = "/v1";

/// 构建完整路由
///
/// `/v1` 与 `/v1/*` 转发到上游，其余路径走静态目录；
/// 安全响应头覆盖所有响应。
pub fn build_router(config: &Config) -> Result<Router, EdgeError> {
    let state = AppState {
        upstream: UpstreamService::new(config)?,
    };
    let security = Arc::new(SecurityHeaders::new(&config.csp)?);

    let proxy = Router::new()
        .route(PROXY_PREFIX, any(proxy_request))
        .route(&format!("{PROXY_PREFIX}/*rest"), any(proxy_request))
        .with_state(state);

    let router = assets::service::mount(proxy, &config.public_dir, config.spa_fallback).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(request_logging_middleware))
            .layer(middleware::from_fn_with_state(
                security,
                apply_security_headers,
            )),
    );

    Ok(router)
}

/// 绑定端口并运行，直到收到退出信号
pub async fn run(config: Config) -> Result<(), EdgeError> {
    let addr = config.listen_addr();

    info!(
        environment = config.environment.as_deref().unwrap_or("unset"),
        backend = %config.backend_url,
        public_dir = %config.public_dir.display(),
        spa_fallback = config.spa_fallback,
        upstream_insecure_tls = config.upstream_insecure_tls,
        upstream_timeout_ms = config.upstream_timeout.map(|t| t.as_millis() as u64),
        forward_headers = ?config.forward_headers,
        "启动边缘服务"
    );

    let app = build_router(&config)?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| EdgeError::Bind { addr, source })?;
    info!("服务运行在 http://{}", addr);

    serve(listener, app).await?;

    info!("服务已关闭");
    Ok(())
}

/// 在已绑定的监听器上运行路由
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), EdgeError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(EdgeError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl+C，正在关闭"),
            Err(e) => {
                error!("无法安装 Ctrl+C 处理器: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("收到 SIGTERM，正在关闭");
            }
            Err(e) => {
                warn!("无法安装 SIGTERM 处理器: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
