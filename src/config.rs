//! Configuration for Chatgate
//!
//! CLI arguments and environment variable handling using clap. Env files are loaded by
//! [`crate::util::load_env_files`] before parsing.

use clap::Parser;

use crate::body::BodyLimits;
use crate::dispatcher::DispatchSettings;
use crate::route_table::normalize_path;
use crate::transport::Transport;

const MIB: usize = 1024 * 1024;

/// Chatgate - HTTP gateway core for chat-completion services
#[derive(Parser, Debug, Clone)]
#[command(name = "chatgate")]
#[command(about = "HTTP gateway for chat-completion services")]
pub struct GatewayConfig {
    /// Prefix prepended to every route (e.g. "/api")
    #[arg(long, env = "SERVER_URL_PREFIX", default_value = "")]
    pub url_prefix: String,

    /// Host to bind
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Maximum request payload in bytes
    #[arg(long, env = "REQUEST_BODY_LIMIT", default_value_t = 100 * MIB)]
    pub body_limit: usize,

    /// Maximum number of multipart parts
    #[arg(long, env = "REQUEST_MAX_FIELDS", default_value = "1000")]
    pub max_fields: usize,

    /// Maximum size of a single uploaded file in bytes
    #[arg(long, env = "REQUEST_MAX_FILE_BYTES", default_value_t = 100 * MIB as u64)]
    pub max_file_bytes: u64,

    /// Log every request and its elapsed time
    #[arg(long, env = "REQUEST_LOG", default_value = "false")]
    pub request_log: bool,

    /// Host transport
    #[arg(long, env = "SERVER_TRANSPORT", value_enum, default_value_t = Transport::Actix)]
    pub transport: Transport,

    /// Fail at startup when a (method, path) pair is declared twice
    #[arg(long, env = "STRICT_ROUTES", default_value = "false")]
    pub strict_routes: bool,

    /// Debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url_prefix: String::new(),
            host: "0.0.0.0".into(),
            port: 8000,
            body_limit: 100 * MIB,
            max_fields: 1000,
            max_file_bytes: 100 * MIB as u64,
            request_log: false,
            transport: Transport::Actix,
            strict_routes: false,
            debug: false,
        }
    }
}

impl GatewayConfig {
    pub fn body_limits(&self) -> BodyLimits {
        BodyLimits {
            max_bytes: self.body_limit,
            max_fields: self.max_fields,
            max_file_bytes: self.max_file_bytes,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            request_log: self.request_log,
            primary_route: format!(
                "POST -> {}",
                normalize_path(&[&self.url_prefix, "/v1/chat/completions"])
            ),
            body_limits: self.body_limits(),
        }
    }

    /// Addresses to bind. A host that is neither a wildcard nor loopback also gets
    /// `localhost` on the same port.
    pub fn bind_addrs(&self) -> Vec<(String, u16)> {
        let mut addrs = vec![(self.host.clone(), self.port)];
        if !matches!(
            self.host.as_str(),
            "0.0.0.0" | "::" | "localhost" | "127.0.0.1" | "::1"
        ) {
            addrs.push(("localhost".into(), self.port));
        }
        addrs
    }
}
