use serde::{Deserialize, Serialize};

/// Configuration for the local submission listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Address to listen on.
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Hostname announced in the banner and EHLO reply.
    #[serde(default = "defaults::hostname")]
    pub hostname: String,

    /// Largest message accepted, in bytes. Advertised via the SIZE
    /// extension and enforced during DATA.
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            hostname: defaults::hostname(),
            max_message_size: defaults::max_message_size(),
        }
    }
}

/// Configuration for the upstream SMTP server messages are relayed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream host.
    #[serde(default = "defaults::upstream_host")]
    pub host: String,

    /// Upstream port.
    #[serde(default = "defaults::upstream_port")]
    pub port: u16,

    /// Username for AUTH PLAIN. Authentication is attempted only when both
    /// username and password are set.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for AUTH PLAIN.
    #[serde(default)]
    pub password: Option<String>,

    /// Upgrade the connection with STARTTLS before authenticating.
    #[serde(default)]
    pub starttls: bool,

    /// Skip upstream certificate verification. For testing against
    /// self-signed certificates only.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Domain presented in EHLO.
    #[serde(default = "defaults::hostname")]
    pub ehlo_domain: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: defaults::upstream_host(),
            port: defaults::upstream_port(),
            username: None,
            password: None,
            starttls: false,
            accept_invalid_certs: false,
            ehlo_domain: defaults::hostname(),
        }
    }
}

impl UpstreamConfig {
    /// The `host:port` string to connect to.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

mod defaults {
    pub fn host() -> String {
        "127.0.0.1".to_owned()
    }

    pub const fn port() -> u16 {
        2525
    }

    pub fn hostname() -> String {
        "postrider".to_owned()
    }

    pub const fn max_message_size() -> usize {
        10 * 1024 * 1024
    }

    pub fn upstream_host() -> String {
        "localhost".to_owned()
    }

    pub const fn upstream_port() -> u16 {
        25
    }
}
