//! 目标端点
//!
//! 会话构造时传入的 host 字符串在这里被解析成 [`Endpoint`]：
//!
//! - 先整体转为小写；
//! - `https://` 表示 TLS，默认端口 443；`http://` 表示明文，默认端口 80；
//! - 可选的 `:port` 覆盖默认端口，合法范围是 1–65535；
//! - 路径部分被忽略；
//! - 没有可识别的 scheme 时，得到一个**不可连接**的端点，之后每次提交都以
//!   `BadServerAddress` 失败，而会话本身照常构造。

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use http::{HeaderValue, Uri};

/// 会话连接的目标。
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    domain: Option<String>,
    port: u16,
    tls: bool,
    // 显式给出的地址，或缓存的解析结果
    addr: Option<SocketAddr>,
}

impl Endpoint {
    /// 解析一个 host 字符串（`http://a.b:8080`、`https://c.d/path` 等）。
    ///
    /// 这个函数不会失败；无法识别的输入得到一个不可连接的端点，
    /// 可以用 [`is_connectable`](Endpoint::is_connectable) 检查。
    pub fn parse(host: &str) -> Endpoint {
        let lower = host.trim().to_ascii_lowercase();

        let (tls, default_port) = if lower.starts_with("https://") {
            (true, 443)
        } else if lower.starts_with("http://") {
            (false, 80)
        } else {
            debug!("host {:?} has no http:// or https:// scheme", host);
            return Endpoint::unusable(false);
        };

        let uri = match lower.parse::<Uri>() {
            Ok(uri) => uri,
            Err(_err) => {
                debug!("host {:?} is not a valid uri: {}", host, _err);
                return Endpoint::unusable(tls);
            }
        };

        let name = match uri.host() {
            Some(name) => name.trim_start_matches('[').trim_end_matches(']'),
            None => return Endpoint::unusable(tls),
        };
        if name.is_empty() {
            return Endpoint::unusable(tls);
        }

        // `Uri::port()` 会把越界的端口当作不存在，这里自己取出端口部分
        let authority = uri.authority().map(|a| a.as_str()).unwrap_or("");
        let port = match explicit_port(authority) {
            None | Some("") => default_port,
            Some(digits) => match digits.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    debug!("host {:?} has an invalid port {:?}", host, digits);
                    return Endpoint::unusable(tls);
                }
            },
        };

        // IP 字面量不需要解析
        let addr = name.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port));

        Endpoint {
            domain: Some(name.to_owned()),
            port,
            tls,
            addr,
        }
    }

    /// 直接指定套接字地址，不做任何解析。
    pub fn from_addr(addr: SocketAddr, tls: bool) -> Endpoint {
        Endpoint {
            domain: None,
            port: addr.port(),
            tls,
            addr: Some(addr),
        }
    }

    fn unusable(tls: bool) -> Endpoint {
        Endpoint {
            domain: None,
            port: 0,
            tls,
            addr: None,
        }
    }

    /// 域名（或 IP 字面量）部分，小写。
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// 端口。不可连接的端点返回 0。
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 是否使用 TLS。
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// 已知的套接字地址：显式给出的、IP 字面量、或已缓存的解析结果。
    ///
    /// 未指定的地址（如 `0.0.0.0`）和端口 0 都视为未知。
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr
            .filter(|addr| !addr.ip().is_unspecified() && addr.port() != 0)
    }

    /// 这个端点是否有可能被连接。
    pub fn is_connectable(&self) -> bool {
        self.socket_addr().is_some() || self.needs_resolution()
    }

    /// 是否还需要先做一次域名解析。
    pub(crate) fn needs_resolution(&self) -> bool {
        self.socket_addr().is_none() && self.domain.is_some() && self.port != 0
    }

    /// 缓存解析结果。端口始终使用端点自己的端口。
    pub(crate) fn set_resolved(&mut self, addr: SocketAddr) {
        self.addr = Some(SocketAddr::new(addr.ip(), self.port));
    }

    fn default_port(&self) -> u16 {
        if self.tls {
            443
        } else {
            80
        }
    }

    /// 请求中自动添加的 `Host` 头部。端口不是 scheme 默认端口时附带 `:port`。
    pub(crate) fn host_header(&self) -> Option<HeaderValue> {
        let host = match (self.domain.as_deref(), self.addr) {
            (Some(domain), _) if domain.contains(':') => format!("[{}]", domain),
            (Some(domain), _) => domain.to_owned(),
            (None, Some(SocketAddr::V4(addr))) => addr.ip().to_string(),
            (None, Some(SocketAddr::V6(addr))) => format!("[{}]", addr.ip()),
            (None, None) => return None,
        };
        let value = if self.port == self.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        };
        HeaderValue::from_str(&value).ok()
    }
}

/// authority 中 `:` 之后的端口部分（跳过 userinfo 和 IPv6 的方括号）。
fn explicit_port(authority: &str) -> Option<&str> {
    let start = authority.rfind('@').map_or(0, |i| i + 1);
    let host_port = &authority[start..];
    let host_end = host_port.rfind(']').map_or(0, |i| i + 1);
    host_port[host_end..]
        .rfind(':')
        .map(|i| &host_port[host_end + i + 1..])
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("domain", &self.domain)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("addr", &self.addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_and_ports() {
        let ep = Endpoint::parse("http://Example.COM");
        assert_eq!(ep.domain(), Some("example.com"));
        assert_eq!(ep.port(), 80);
        assert!(!ep.is_tls());
        assert!(ep.needs_resolution());

        let ep = Endpoint::parse("HTTPS://example.com");
        assert_eq!(ep.port(), 443);
        assert!(ep.is_tls());

        let ep = Endpoint::parse("http://example.com:8080/ignored/path?q=1");
        assert_eq!(ep.domain(), Some("example.com"));
        assert_eq!(ep.port(), 8080);
        assert!(ep.is_connectable());
    }

    #[test]
    fn ip_literal_skips_resolution() {
        let ep = Endpoint::parse("http://127.0.0.1:3000");
        assert!(!ep.needs_resolution());
        assert_eq!(ep.socket_addr(), Some(([127, 0, 0, 1], 3000).into()));

        let ep = Endpoint::parse("http://[::1]:3000");
        assert_eq!(ep.domain(), Some("::1"));
        assert_eq!(ep.socket_addr().map(|a| a.port()), Some(3000));
        assert_eq!(ep.host_header().unwrap(), "[::1]:3000");
    }

    #[test]
    fn unrecognised_input_is_not_connectable() {
        for host in ["example.com", "ftp://example.com", "", "http://", "http://a:0"] {
            let ep = Endpoint::parse(host);
            assert!(!ep.is_connectable(), "{:?} should not connect", host);
        }
    }

    #[test]
    fn out_of_range_port_is_not_connectable() {
        assert!(!Endpoint::parse("http://example.com:70000").is_connectable());
    }

    #[test]
    fn unspecified_addr_is_not_connectable() {
        let ep = Endpoint::from_addr(([0, 0, 0, 0], 80).into(), false);
        assert!(!ep.is_connectable());
        let ep = Endpoint::from_addr(([10, 0, 0, 1], 0).into(), false);
        assert!(!ep.is_connectable());
    }

    #[test]
    fn host_header_carries_non_default_port() {
        assert_eq!(
            Endpoint::parse("http://example.com").host_header().unwrap(),
            "example.com"
        );
        assert_eq!(
            Endpoint::parse("https://example.com:8443").host_header().unwrap(),
            "example.com:8443"
        );
        assert_eq!(
            Endpoint::parse("https://example.com:443").host_header().unwrap(),
            "example.com"
        );
        let ep = Endpoint::from_addr(([10, 0, 0, 1], 8080).into(), false);
        assert_eq!(ep.host_header().unwrap(), "10.0.0.1:8080");
    }

    #[test]
    fn resolved_addr_is_cached_with_own_port() {
        let mut ep = Endpoint::parse("http://example.com:81");
        ep.set_resolved(([10, 1, 2, 3], 9999).into());
        assert_eq!(ep.socket_addr(), Some(([10, 1, 2, 3], 81).into()));
        assert!(!ep.needs_resolution());
    }
}
