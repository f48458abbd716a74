use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5555;

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub send_timeout: Duration,
    pub console_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            console_prefix: "SERVER MSG> ".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let port = args
            .into_iter()
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            port,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub username: Option<String>,
    pub host: String,
    pub port: u16,
    pub server_role: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            username: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_role: false,
        }
    }
}

impl ClientConfig {
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut args = args.into_iter();

        let username = args.next().filter(|u| !u.trim().is_empty());

        let host = args.next().unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = args
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            username,
            host,
            port,
            server_role: false,
        }
    }
}
