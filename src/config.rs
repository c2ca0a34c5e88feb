use clap::Parser;

/// Runtime configuration for the switchboard, populated from CLI flags or
/// their equivalent environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "switchboard", about = "Rendezvous proxy for game servers behind NAT")]
pub struct Config {
    /// TCP port the HTTP/WebSocket/raw listener binds to.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Shared password that `secret_hash` is expected to be derived from.
    ///
    /// Validation against this value is a documented hook rather than an
    /// enforced check today; registration only requires the field be present
    /// and non-empty.
    #[arg(long, env = "SWITCHBOARD_REGISTRATION_PASSWORD", default_value = "")]
    pub registration_password: String,

    /// Directory the static landing page (`index.html`) is served from.
    #[arg(long, env = "SWITCHBOARD_STATIC_DIR", default_value = "www")]
    pub static_dir: String,

    /// Seconds a session may sit idle (no live parked transport) before it
    /// is swept from the registry.
    #[arg(long, env = "SWITCHBOARD_SESSION_IDLE_SECONDS", default_value_t = 60)]
    pub session_idle_seconds: u64,

    /// Seconds between WebSocket keepalive pings.
    #[arg(long, env = "SWITCHBOARD_PING_INTERVAL_SECONDS", default_value_t = 5)]
    pub ping_interval_seconds: u64,
}

impl Config {
    pub fn session_idle(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_idle_seconds)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ping_interval_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8000,
            registration_password: String::new(),
            static_dir: "www".to_string(),
            session_idle_seconds: 60,
            ping_interval_seconds: 5,
        }
    }
}
