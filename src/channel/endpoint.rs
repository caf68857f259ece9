use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};

pub const DEFAULT_CONTROLLER_ADDR: &str = "127.0.0.1:9999";

/// Robot controller endpoint, fixed for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerEndpoint {
    pub host: String,
    pub port: u16,
}

impl ControllerEndpoint {
    /// Parse a controller address.
    ///
    /// Supports formats:
    /// - `host:port`
    /// - `tcp://host:port`
    /// - `[ipv6]:port`
    pub fn parse(addr: &str) -> Result<Self> {
        let mut remainder = addr.trim();

        if let Some((scheme, rest)) = remainder.split_once("://") {
            if scheme != "tcp" {
                return Err(anyhow!("unsupported controller scheme: {}", scheme));
            }
            remainder = rest;
        }

        let (host, port) = split_host_port(remainder)?;
        if host.is_empty() {
            return Err(anyhow!("missing controller host in {}", addr));
        }
        Ok(Self { host, port })
    }

    /// Resolve to socket addresses, in resolver order.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve controller {}", self))?
            .collect();
        if addrs.is_empty() {
            return Err(anyhow!("controller {} resolved to no addresses", self));
        }
        Ok(addrs)
    }
}

impl Default for ControllerEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
        }
    }
}

impl std::fmt::Display for ControllerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    // IPv6 in brackets: [::1]:9999
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid controller address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing controller port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid controller port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing controller port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid controller port in {}", addr))?;
    Ok((host.to_string(), port))
}
