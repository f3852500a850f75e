//! 安全响应头
//!
//! 包括 Content-Security-Policy 以及与之配套的一组固定安全头，
//! 对代理响应和静态文件响应一视同仁。

use std::{fmt, str::FromStr, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::core::error::EdgeError;

/// CSP 指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    DefaultSrc,
    BaseUri,
    FontSrc,
    FrameAncestors,
    ObjectSrc,
    ScriptSrcAttr,
    ScriptSrc,
    StyleSrc,
    ImgSrc,
    ConnectSrc,
    FrameSrc,
    FormAction,
    UpgradeInsecureRequests,
}

impl Directive {
    pub const ALL: [Directive; 13] = [
        Directive::DefaultSrc,
        Directive::BaseUri,
        Directive::FontSrc,
        Directive::FrameAncestors,
        Directive::ObjectSrc,
        Directive::ScriptSrcAttr,
        Directive::ScriptSrc,
        Directive::StyleSrc,
        Directive::ImgSrc,
        Directive::ConnectSrc,
        Directive::FrameSrc,
        Directive::FormAction,
        Directive::UpgradeInsecureRequests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::DefaultSrc => "default-src",
            Directive::BaseUri => "base-uri",
            Directive::FontSrc => "font-src",
            Directive::FrameAncestors => "frame-ancestors",
            Directive::ObjectSrc => "object-src",
            Directive::ScriptSrcAttr => "script-src-attr",
            Directive::ScriptSrc => "script-src",
            Directive::StyleSrc => "style-src",
            Directive::ImgSrc => "img-src",
            Directive::ConnectSrc => "connect-src",
            Directive::FrameSrc => "frame-src",
            Directive::FormAction => "form-action",
            Directive::UpgradeInsecureRequests => "upgrade-insecure-requests",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知的 CSP 指令名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知的 CSP 指令: {0}")]
pub struct UnknownDirective(pub String);

impl FromStr for Directive {
    type Err = UnknownDirective;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Directive::ALL
            .into_iter()
            .find(|d| d.as_str() == wanted)
            .ok_or_else(|| UnknownDirective(s.to_string()))
    }
}

/// 有序的 指令 -> 来源 表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: Vec<(Directive, Vec<String>)>,
}

impl ContentSecurityPolicy {
    pub fn empty() -> Self {
        Self {
            directives: Vec::new(),
        }
    }

    /// 默认策略：通用安全默认值 + 应用自己的六条白名单指令
    pub fn club_default() -> Self {
        let mut csp = Self::empty();

        csp.set(Directive::DefaultSrc, ["'self'"]);
        csp.set(Directive::BaseUri, ["'self'"]);
        csp.set(Directive::FontSrc, ["'self'", "https:", "data:"]);
        csp.set(Directive::FrameAncestors, ["'self'"]);
        csp.set(Directive::ObjectSrc, ["'none'"]);
        csp.set(Directive::ScriptSrcAttr, ["'none'"]);

        csp.set(
            Directive::ScriptSrc,
            [
                "'self'",
                "https://www.google.com",
                "https://www.gstatic.com",
                "https://challenges.cloudflare.com",
                "https://static.cloudflareinsights.com",
            ],
        );
        csp.set(
            Directive::StyleSrc,
            [
                "'self'",
                "'unsafe-inline'",
                "https://fonts.googleapis.com",
            ],
        );
        csp.set(
            Directive::ImgSrc,
            [
                "'self'",
                "data:",
                "blob:",
                "https://www.gstatic.com",
                "https://*.googleusercontent.com",
            ],
        );
        csp.set(
            Directive::ConnectSrc,
            [
                "'self'",
                "https://www.google.com",
                "https://cloudflareinsights.com",
            ],
        );
        csp.set(
            Directive::FrameSrc,
            [
                "'self'",
                "https://www.google.com",
                "https://challenges.cloudflare.com",
            ],
        );
        csp.set(Directive::FormAction, ["'self'"]);
        csp.set(Directive::UpgradeInsecureRequests, Vec::<String>::new());

        csp
    }

    /// 设置指令的来源列表，已存在时原位替换
    pub fn set<I, S>(&mut self, directive: Directive, sources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();

        match self.directives.iter_mut().find(|(d, _)| *d == directive) {
            Some((_, existing)) => *existing = sources,
            None => self.directives.push((directive, sources)),
        }
    }

    pub fn sources(&self, directive: Directive) -> Option<&[String]> {
        self.directives
            .iter()
            .find(|(d, _)| *d == directive)
            .map(|(_, sources)| sources.as_slice())
    }

    /// 渲染为响应头的值
    pub fn header_value(&self) -> String {
        self.directives
            .iter()
            .map(|(directive, sources)| {
                if sources.is_empty() {
                    directive.as_str().to_string()
                } else {
                    format!("{} {}", directive, sources.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Default for ContentSecurityPolicy {
    fn default() -> Self {
        Self::club_default()
    }
}

/// 预先渲染好的安全响应头
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    pub fn new(csp: &ContentSecurityPolicy) -> Result<Self, EdgeError> {
        let csp_value = HeaderValue::from_str(&csp.header_value())
            .map_err(|e| EdgeError::InvalidSecurityHeader(format!("content-security-policy: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_SECURITY_POLICY, csp_value);

        let fixed: [(&str, &str); 11] = [
            ("cross-origin-opener-policy", "same-origin"),
            ("cross-origin-resource-policy", "same-origin"),
            ("origin-agent-cluster", "?1"),
            ("referrer-policy", "no-referrer"),
            ("strict-transport-security", "max-age=31536000; includeSubDomains"),
            ("x-content-type-options", "nosniff"),
            ("x-dns-prefetch-control", "off"),
            ("x-download-options", "noopen"),
            ("x-frame-options", "SAMEORIGIN"),
            ("x-permitted-cross-domain-policies", "none"),
            ("x-xss-protection", "0"),
        ];
        for (name, value) in fixed {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        Ok(Self { headers })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 覆盖写入响应头
    pub fn apply(&self, target: &mut HeaderMap) {
        target.remove("x-powered-by");
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// 安全响应头中间件
pub async fn apply_security_headers(
    State(security): State<Arc<SecurityHeaders>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    security.apply(response.headers_mut());
    response
}
