//! Config-file + environment-variable overlay, plus the handful of
//! hosting knobs (`EA_CONFIG`, `HOST`, `PORT`, `RUST_LOG`/`EA_LOG`,
//! `CITATION_SWEEP_INTERVAL_SECONDS`) that `ea_domain::config::Config`
//! doesn't itself know about because they govern the binary, not the
//! orchestrator.

use ea_domain::config::Config;

/// Fully-resolved gateway configuration: the shared [`Config`] plus the
/// binary-only knobs layered on top of it.
pub struct GatewayConfig {
    pub inner: Config,
    pub citation_sweep_interval_seconds: u64,
    pub log_filter: String,
}

/// Load `EA_CONFIG` (default `config.toml`) if present, apply the named
/// environment overrides, and fold in the gateway-only knobs.
pub fn load() -> GatewayConfig {
    let config_path = std::env::var("EA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut inner = Config::load_or_default(&config_path).apply_env_overrides();

    if let Ok(host) = std::env::var("HOST") {
        inner.server.host = host;
    }
    if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
        inner.server.port = port;
    }

    let citation_sweep_interval_seconds = std::env::var("CITATION_SWEEP_INTERVAL_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);

    let log_filter = std::env::var("EA_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".into());

    GatewayConfig {
        inner,
        citation_sweep_interval_seconds,
        log_filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        std::env::remove_var("EA_CONFIG");
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        let cfg = load();
        assert_eq!(cfg.inner.server.port, 8080);
        assert_eq!(cfg.citation_sweep_interval_seconds, 300);
    }

    #[test]
    fn host_and_port_env_vars_override() {
        std::env::set_var("HOST", "127.0.0.1");
        std::env::set_var("PORT", "9999");
        let cfg = load();
        assert_eq!(cfg.inner.server.host, "127.0.0.1");
        assert_eq!(cfg.inner.server.port, 9999);
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
    }
}
