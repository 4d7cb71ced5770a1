use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

use crate::supabase::SupabaseConfig;

pub const ARG_SUPABASE_URL: &str = "supabase-url";
pub const ARG_SUPABASE_ANON_KEY: &str = "supabase-anon-key";
pub const ARG_SUPABASE_SERVICE_ROLE_KEY: &str = "supabase-service-role-key";
pub const ARG_SUPABASE_JWT_SECRET: &str = "supabase-jwt-secret";
pub const ARG_UPSTREAM_TIMEOUT_SECONDS: &str = "upstream-timeout-seconds";

#[derive(Debug)]
pub struct Options {
    pub config: SupabaseConfig,
    pub jwt_secret: Option<SecretString>,
}

impl Options {
    /// Parse the Supabase project arguments.
    ///
    /// # Errors
    /// Returns an error if a key is missing or the project URL is not http(s).
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_required = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let raw_url = read_required(ARG_SUPABASE_URL)?;
        let url = Url::parse(&raw_url).with_context(|| format!("invalid SUPABASE_URL: {raw_url}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("invalid SUPABASE_URL: {raw_url}"));
        }

        let anon_key = SecretString::from(read_required(ARG_SUPABASE_ANON_KEY)?);
        let service_role_key = SecretString::from(read_required(ARG_SUPABASE_SERVICE_ROLE_KEY)?);
        let timeout = matches
            .get_one::<u64>(ARG_UPSTREAM_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(10);

        let jwt_secret = matches
            .get_one::<String>(ARG_SUPABASE_JWT_SECRET)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(SecretString::from);

        Ok(Self {
            config: SupabaseConfig::new(&raw_url, anon_key, service_role_key)
                .with_timeout_seconds(timeout),
            jwt_secret,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SUPABASE_URL)
                .long(ARG_SUPABASE_URL)
                .help("Supabase project URL, example: https://<project>.supabase.co")
                .env("SUPABASE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SUPABASE_ANON_KEY)
                .long(ARG_SUPABASE_ANON_KEY)
                .help("Supabase anon (public) key")
                .env("SUPABASE_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SUPABASE_SERVICE_ROLE_KEY)
                .long(ARG_SUPABASE_SERVICE_ROLE_KEY)
                .help("Supabase service role key, used for admin and data calls")
                .env("SUPABASE_SERVICE_ROLE_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SUPABASE_JWT_SECRET)
                .long(ARG_SUPABASE_JWT_SECRET)
                .help("JWT secret; when set, access tokens are verified locally (HS256)")
                .env("SUPABASE_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_TIMEOUT_SECONDS)
                .long(ARG_UPSTREAM_TIMEOUT_SECONDS)
                .help("Timeout for every call to Supabase, in seconds")
                .env("AFFITTI_UPSTREAM_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
