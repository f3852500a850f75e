//! 启动配置
//!
//! 只在启动时从环境变量读取一次，构造成不可变的 [`Config`]，
//! 之后显式传给路由构造函数。

use std::{
    collections::BTreeMap,
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use axum::http::HeaderName;
use serde::Deserialize;
use url::Url;

use crate::core::{
    forwarding::DEFAULT_FORWARD_HEADERS,
    security::{ContentSecurityPolicy, Directive},
};

pub const PORT: &str = "PORT";
pub const BACKEND_URL: &str = "BACKEND_URL";
pub const NODE_ENV: &str = "NODE_ENV";
pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
pub const PUBLIC_DIR: &str = "PUBLIC_DIR";
pub const SPA_FALLBACK: &str = "SPA_FALLBACK";
pub const UPSTREAM_INSECURE_TLS: &str = "UPSTREAM_INSECURE_TLS";
pub const UPSTREAM_TIMEOUT_MS: &str = "UPSTREAM_TIMEOUT_MS";
pub const FORWARD_HEADERS: &str = "FORWARD_HEADERS";
pub const EDGE_POLICY_FILE: &str = "EDGE_POLICY_FILE";

const DEFAULT_PUBLIC_DIR: &str = "build";

/// 边缘进程配置
#[derive(Debug, Clone)]
pub struct Config {
    /// 监听端口
    pub port: u16,
    /// 绑定地址
    pub bind_address: IpAddr,
    /// 上游 API 地址，`/v1` 请求转发到这里
    pub backend_url: Url,
    /// 静态资源目录
    pub public_dir: PathBuf,
    /// 部署环境标签，只用于启动日志
    pub environment: Option<String>,
    /// 跳过上游证书校验，必须显式开启
    pub upstream_insecure_tls: bool,
    /// 单次上游请求的总超时，未设置时不限制
    pub upstream_timeout: Option<Duration>,
    /// 找不到静态文件时返回 index.html
    pub spa_fallback: bool,
    /// 转发给上游的客户端头白名单
    pub forward_headers: Vec<HeaderName>,
    pub csp: ContentSecurityPolicy,
}

impl Config {
    /// 从进程环境变量加载
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var(PORT) {
            Some(raw) => parse_port(&raw)?,
            None => return Err(ConfigError::Missing(PORT)),
        };

        let backend_url = match var(BACKEND_URL) {
            Some(raw) => parse_backend_url(&raw)?,
            None => return Err(ConfigError::Missing(BACKEND_URL)),
        };

        let bind_address = match var(BIND_ADDRESS) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(raw.clone()))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let public_dir = var(PUBLIC_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR));

        let upstream_insecure_tls = match var(UPSTREAM_INSECURE_TLS) {
            Some(raw) => parse_flag(UPSTREAM_INSECURE_TLS, &raw)?,
            None => false,
        };

        let upstream_timeout = var(UPSTREAM_TIMEOUT_MS)
            .map(|raw| parse_timeout(&raw))
            .transpose()?;

        let spa_fallback = match var(SPA_FALLBACK) {
            Some(raw) => parse_flag(SPA_FALLBACK, &raw)?,
            None => false,
        };

        let mut forward_headers = parse_header_names(DEFAULT_FORWARD_HEADERS.iter().copied())?;
        let mut csp = ContentSecurityPolicy::club_default();

        if let Some(path) = var(EDGE_POLICY_FILE) {
            let policy = PolicyFile::load(&path)?;
            if let Some(names) = policy.forward_headers {
                forward_headers = parse_header_names(names.iter().map(String::as_str))?;
            }
            for (name, sources) in policy.csp {
                let directive: Directive = name
                    .parse()
                    .map_err(|_| ConfigError::UnknownDirective(name.clone()))?;
                csp.set(directive, sources);
            }
        }

        // 环境变量优先于策略文件
        if let Some(raw) = var(FORWARD_HEADERS) {
            forward_headers = parse_header_names(raw.split(',').filter(|s| !s.trim().is_empty()))?;
        }

        Ok(Self {
            port,
            bind_address,
            backend_url,
            public_dir,
            environment: var(NODE_ENV),
            upstream_insecure_tls,
            upstream_timeout,
            spa_fallback,
            forward_headers,
            csp,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// 可选的 TOML 策略文件
///
/// ```toml
/// forward_headers = ["cf-connecting-ip", "cf-ipcountry"]
///
/// [csp]
/// connect-src = ["'self'", "https://api.example.com"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    pub forward_headers: Option<Vec<String>>,
    #[serde(default)]
    pub csp: BTreeMap<String, Vec<String>>,
}

impl PolicyFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// 配置错误类型，全部在启动时发生且不可恢复
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("缺少必需的环境变量 {0}")]
    Missing(&'static str),
    #[error("无效的端口: {0:?}")]
    InvalidPort(String),
    #[error("无效的上游地址 {value:?}: {reason}")]
    InvalidBackendUrl { value: String, reason: String },
    #[error("无效的上游超时（毫秒）: {0:?}")]
    InvalidTimeout(String),
    #[error("无效的绑定地址: {0:?}")]
    InvalidBindAddress(String),
    #[error("{key} 的值无效: {value:?}，有效值: true/false/1/0/yes/no/on/off")]
    InvalidFlag { key: &'static str, value: String },
    #[error("无效的请求头名称: {0:?}")]
    InvalidHeaderName(String),
    #[error("未知的 CSP 指令: {0:?}")]
    UnknownDirective(String),
    #[error("读取 {path:?} 失败: {reason}")]
    FileRead { path: PathBuf, reason: String },
    #[error("解析 {path:?} 失败: {reason}")]
    Parse { path: PathBuf, reason: String },
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}

fn parse_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBackendUrl {
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("不支持的协议 {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("缺少主机名".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("不能包含查询参数或片段".to_string()));
    }

    Ok(url)
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidTimeout(raw.to_string())),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_header_names<'a, I>(names: I) -> Result<Vec<HeaderName>, ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parsed: Vec<HeaderName> = Vec::new();

    for name in names {
        let lowered = name.trim().to_ascii_lowercase();
        let header = HeaderName::from_bytes(lowered.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(name.to_string()))?;
        if !parsed.contains(&header) {
            parsed.push(header);
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![(PORT, "8080"), (BACKEND_URL, "https://api.example.com")]
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::from_lookup(lookup(&minimal())).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.backend_url.as_str(), "https://api.example.com/");
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.public_dir, PathBuf::from("build"));
        assert!(!config.upstream_insecure_tls);
        assert!(!config.spa_fallback);
        assert!(config.upstream_timeout.is_none());
        assert!(config.environment.is_none());
        assert_eq!(config.forward_headers.len(), DEFAULT_FORWARD_HEADERS.len());
        assert_eq!(config.csp, ContentSecurityPolicy::club_default());
    }

    #[test]
    fn test_missing_port() {
        let err = Config::from_lookup(lookup(&[(BACKEND_URL, "http://api")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(PORT)));
    }

    #[test]
    fn test_blank_port_counts_as_missing() {
        let err = Config::from_lookup(lookup(&[(PORT, "  "), (BACKEND_URL, "http://api")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(PORT)));
    }

    #[test]
    fn test_non_numeric_port() {
        for raw in ["http", "-1", "70000", "0", "80.5"] {
            let err = Config::from_lookup(lookup(&[(PORT, raw), (BACKEND_URL, "http://api")]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPort(_)), "{raw}");
        }
    }

    #[test]
    fn test_missing_backend_url() {
        let err = Config::from_lookup(lookup(&[(PORT, "3000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(BACKEND_URL)));
    }

    #[test]
    fn test_invalid_backend_url() {
        for raw in ["not a url", "ftp://api.example.com", "http://api?x=1"] {
            let err = Config::from_lookup(lookup(&[(PORT, "3000"), (BACKEND_URL, raw)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidBackendUrl { .. }),
                "{raw}: {err}"
            );
        }
    }

    #[test]
    fn test_optional_values() {
        let mut vars = minimal();
        vars.extend([
            (NODE_ENV, "production"),
            (BIND_ADDRESS, "127.0.0.1"),
            (PUBLIC_DIR, "/srv/club"),
            (UPSTREAM_INSECURE_TLS, "TRUE"),
            (SPA_FALLBACK, "on"),
            (UPSTREAM_TIMEOUT_MS, "2500"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.environment.as_deref(), Some("production"));
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.public_dir, PathBuf::from("/srv/club"));
        assert!(config.upstream_insecure_tls);
        assert!(config.spa_fallback);
        assert_eq!(config.upstream_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_invalid_timeout_is_fatal() {
        for raw in ["0", "soon", "-5", "1.5"] {
            let mut vars = minimal();
            vars.push((UPSTREAM_TIMEOUT_MS, raw));
            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTimeout(_)), "{raw}");
        }
    }

    #[test]
    fn test_invalid_flag_is_fatal() {
        let mut vars = minimal();
        vars.push((UPSTREAM_INSECURE_TLS, "maybe"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidFlag {
                key: UPSTREAM_INSECURE_TLS,
                ..
            }
        ));
    }

    #[test]
    fn test_forward_headers_override() {
        let mut vars = minimal();
        vars.push((FORWARD_HEADERS, "CF-Connecting-IP, cf-ipcountry,,cf-ipcountry"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        let names: Vec<&str> = config.forward_headers.iter().map(|h| h.as_str()).collect();
        assert_eq!(names, vec!["cf-connecting-ip", "cf-ipcountry"]);
    }

    #[test]
    fn test_invalid_forward_header() {
        let mut vars = minimal();
        vars.push((FORWARD_HEADERS, "cf ip"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeaderName(_)));
    }

    #[test]
    fn test_policy_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        fs::write(
            &path,
            r#"
forward_headers = ["cf-connecting-ip"]

[csp]
connect-src = ["'self'", "https://api.example.com"]
"#,
        )
        .unwrap();

        let mut vars = minimal();
        let path_str = path.to_string_lossy().to_string();
        vars.push((EDGE_POLICY_FILE, Box::leak(path_str.into_boxed_str())));
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.forward_headers, vec![HeaderName::from_static("cf-connecting-ip")]);
        assert_eq!(
            config.csp.sources(Directive::ConnectSrc).unwrap(),
            ["'self'".to_string(), "https://api.example.com".to_string()]
        );
        assert_eq!(
            config.csp.sources(Directive::FormAction).unwrap(),
            ["'self'".to_string()]
        );
    }

    #[test]
    fn test_policy_file_unknown_directive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        fs::write(&path, "[csp]\nmedia-src = [\"'self'\"]\n").unwrap();

        let mut vars = minimal();
        let path_str = path.to_string_lossy().to_string();
        vars.push((EDGE_POLICY_FILE, Box::leak(path_str.into_boxed_str())));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDirective(_)));
    }

    #[test]
    fn test_policy_file_missing() {
        let mut vars = minimal();
        vars.push((EDGE_POLICY_FILE, "/nonexistent/club-edge/policy.toml"));
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
