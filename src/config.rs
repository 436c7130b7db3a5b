use clap::Parser;
use std::net::{IpAddr, SocketAddr};

/// MentorLog API server.
///
/// Every option can also be given through the environment variable named next to it.
#[derive(Parser, Debug, Clone)]
#[command(name = "mentorlog", version, about = "Tutoring academy management API")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// JSON file holding the database, created if missing
    #[arg(long, env = "DATABASE_PATH", default_value = "db.json")]
    pub database: String,

    /// Key used to sign bearer tokens
    #[arg(long, env = "JWT_SECRET", default_value = "fallback_secret", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "TOKEN_TTL_DAYS", default_value_t = 30)]
    pub token_ttl_days: i64,

    /// Administrator account ensured at startup
    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@mentorlog.com")]
    pub admin_email: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "Admin@123", hide_env_values = true)]
    pub admin_password: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: log::LevelFilter,

    /// Include raw error details in error responses
    #[arg(long, env = "DEVELOPMENT")]
    pub development: bool,
}

impl Config {
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["mentorlog"]);

        assert_eq!(config.socket_address().to_string(), "0.0.0.0:5000");
        assert_eq!(config.database, "db.json");
        assert_eq!(config.token_ttl_days, 30);
        assert_eq!(config.log_level, log::LevelFilter::Info);
        assert!(!config.development);
    }

    #[test]
    fn command_line_overrides() {
        let config = Config::parse_from([
            "mentorlog",
            "--port",
            "8080",
            "--bind-address",
            "127.0.0.1",
            "--log-level",
            "debug",
            "--development",
        ]);

        assert_eq!(config.socket_address().to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, log::LevelFilter::Debug);
        assert!(config.development);
    }
}
