//! Maps validated CLI matches to the action the binary runs.

use crate::api::handlers::auth::DeploymentMode;
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_ENV, ARG_PORT, cookies, email, rate_limit, supabase};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let mode = matches
        .get_one::<DeploymentMode>(ARG_ENV)
        .copied()
        .unwrap_or_default();

    let supabase_opts = supabase::Options::parse(matches)?;
    let cookie_opts = cookies::Options::parse(matches);
    let rate_limit_opts = rate_limit::Options::parse(matches);
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        mode,
        supabase: supabase_opts.config,
        jwt_secret: supabase_opts.jwt_secret,
        cookies: cookie_opts.settings,
        rate_limit: rate_limit_opts.config,
        frontend_prod: email_opts.frontend_prod,
        reset_url: email_opts.reset_url,
        smtp: email_opts.smtp,
        admin_recipients: email_opts.admin_recipients,
    }))
}
