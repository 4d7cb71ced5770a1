use crate::{
    api::{
        self, Services,
        email::{EmailSender, LogEmailSender, Notifier, SmtpConfig, SmtpEmailSender},
        handlers::auth::{AuthConfig, AuthState, CookieSettings, DeploymentMode},
        rate_limit::{FixedWindowLimiter, RateLimitConfig},
    },
    cli::telemetry,
    supabase::{
        GoTrueClient, IdentityProvider, PostgrestStore, ProfileStore, SupabaseConfig, TenantStore,
    },
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub mode: DeploymentMode,
    pub supabase: SupabaseConfig,
    pub jwt_secret: Option<SecretString>,
    pub cookies: CookieSettings,
    pub rate_limit: RateLimitConfig,
    pub frontend_prod: String,
    pub reset_url: String,
    pub smtp: Option<SmtpConfig>,
    pub admin_recipients: Vec<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if an upstream client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let identity: Arc<dyn IdentityProvider> = Arc::new(GoTrueClient::new(&args.supabase)?);
    let store = Arc::new(PostgrestStore::new(&args.supabase)?);
    let profiles: Arc<dyn ProfileStore> = store.clone();
    let tenants: Arc<dyn TenantStore> = store;

    let mut config = AuthConfig::new(args.mode, args.cookies).with_jwt_secret(args.jwt_secret);
    if !args.reset_url.is_empty() {
        config = config.with_reset_url(args.reset_url);
    }

    let sender: Arc<dyn EmailSender> = match &args.smtp {
        Some(smtp) => Arc::new(SmtpEmailSender::new(smtp)?),
        None => Arc::new(LogEmailSender),
    };

    let services = Services {
        auth: Arc::new(AuthState::new(config, identity)),
        profiles,
        tenants,
        notifier: Arc::new(Notifier::new(sender, args.admin_recipients)),
        limiter: Arc::new(FixedWindowLimiter::new(args.rate_limit)),
    };

    let result = api::new(args.port, services, &args.frontend_prod).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let mode = match args.mode {
        DeploymentMode::Local => "local",
        DeploymentMode::Production => "production",
    };
    let token_check = if args.jwt_secret.is_some() {
        "local (HS256)"
    } else {
        "identity provider"
    };
    let smtp = args.smtp.as_ref().map_or_else(
        || "disabled (log only)".to_string(),
        |smtp| format!("{}:{} as {}", smtp.host, smtp.port, smtp.from),
    );
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("env", mode.to_string()),
        ("supabase_url", args.supabase.url().to_string()),
        ("upstream_timeout", format!("{:?}", args.supabase.timeout())),
        ("token_verification", token_check.to_string()),
        (
            "cookies",
            format!("{} / {}", args.cookies.access_name, args.cookies.refresh_name),
        ),
        (
            "rate_limit",
            format!(
                "{} req / {:?} on {}",
                args.rate_limit.max_requests(),
                args.rate_limit.window(),
                args.rate_limit.protected_paths().join(",")
            ),
        ),
        ("frontend_prod", args.frontend_prod.clone()),
        ("smtp", smtp),
        ("admin_recipients", args.admin_recipients.len().to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
