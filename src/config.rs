use std::time::Duration;

use clap::Args;

use crate::models::log_message::DEFAULT_COLLECTION;

#[derive(Debug, Clone, Args)]
pub struct Config {
    #[clap(long, env)]
    pub database_uri: String,

    #[clap(long, env)]
    pub database_name: String,

    #[clap(long, env, default_value = "info")]
    pub log_level: String,

    /// Upper bound for every single database request.
    #[clap(long, env, default_value_t = 15)]
    pub request_timeout_secs: u64,

    #[clap(long, env, default_value = DEFAULT_COLLECTION)]
    pub log_collection: String,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
