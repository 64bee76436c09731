use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // comma seperated list of upstream domains the proxy may fetch from, like
    // example.com,cdn.example.net
    // subdomains of an entry are trusted too, an empty list trusts nothing
    #[clap(long, env, value_delimiter = ',', required = true)]
    pub trusted_domains: Vec<String>,

    // route of the proxy, rewritten manifests point back at this path
    #[clap(long, env, default_value = "/proxy")]
    pub proxy_path: String,

    // sent to every upstream instead of whatever the player sent us
    #[clap(long, env, default_value = "FlowTV-Player/1.0")]
    pub upstream_user_agent: String,

    // wait for response headers and between body reads, manifests must arrive whole within it
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub connect_timeout_secs: u64,

    // manifests are buffered in full before rewriting, anything bigger than this is refused
    #[clap(long, env, default_value = "8388608")]
    pub max_manifest_bytes: usize,

    // m3u playlist that the channel api is served from
    #[clap(long, env, default_value = "public/myplaylist.m3u")]
    pub playlist_path: PathBuf,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    // only used by the json api, the proxy route always answers with *
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // mostly for tests, the real values come from the env
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            trusted_domains: Vec::new(),
            proxy_path: "/proxy".to_string(),
            upstream_user_agent: "FlowTV-Player/1.0".to_string(),
            upstream_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_manifest_bytes: 8 * 1024 * 1024,
            playlist_path: PathBuf::from("public/myplaylist.m3u"),
            cors_origin: "*".to_string(),
            sentry_dsn: None,
        }
    }
}

impl AppConfig {
    /// proxy path with the leading slash the router needs
    pub fn proxy_route(&self) -> String {
        let path = self.proxy_path.trim();
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }
}
