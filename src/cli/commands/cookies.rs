use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};

use crate::api::handlers::auth::{
    CookieSettings, SameSite,
    config::{
        DEFAULT_ACCESS_COOKIE_NAME, DEFAULT_ACCESS_MAX_AGE, DEFAULT_REFRESH_COOKIE_NAME,
        DEFAULT_REFRESH_MAX_AGE,
    },
};

pub const ARG_ACCESS_COOKIE_NAME: &str = "access-cookie-name";
pub const ARG_REFRESH_COOKIE_NAME: &str = "refresh-cookie-name";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_SAMESITE: &str = "cookie-samesite";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_ACCESS_MAX_AGE: &str = "access-max-age";
pub const ARG_REFRESH_MAX_AGE: &str = "refresh-max-age";

/// Cookie settings as given on the command line. The deployment mode is
/// applied later, when the policy is resolved.
#[derive(Debug, Clone)]
pub struct Options {
    pub settings: CookieSettings,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let name = |id: &str, default: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            settings: CookieSettings {
                access_name: name(ARG_ACCESS_COOKIE_NAME, DEFAULT_ACCESS_COOKIE_NAME),
                refresh_name: name(ARG_REFRESH_COOKIE_NAME, DEFAULT_REFRESH_COOKIE_NAME),
                secure: matches.get_flag(ARG_COOKIE_SECURE),
                same_site: matches
                    .get_one::<SameSite>(ARG_COOKIE_SAMESITE)
                    .copied()
                    .unwrap_or_default(),
                domain: matches
                    .get_one::<String>(ARG_COOKIE_DOMAIN)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
                access_max_age: matches
                    .get_one::<u64>(ARG_ACCESS_MAX_AGE)
                    .copied()
                    .unwrap_or(DEFAULT_ACCESS_MAX_AGE),
                refresh_max_age: matches
                    .get_one::<u64>(ARG_REFRESH_MAX_AGE)
                    .copied()
                    .unwrap_or(DEFAULT_REFRESH_MAX_AGE),
            },
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_COOKIE_NAME)
                .long(ARG_ACCESS_COOKIE_NAME)
                .help("Name of the access token cookie")
                .env("ACCESS_COOKIE_NAME")
                .default_value(DEFAULT_ACCESS_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_REFRESH_COOKIE_NAME)
                .long(ARG_REFRESH_COOKIE_NAME)
                .help("Name of the refresh token cookie")
                .env("REFRESH_COOKIE_NAME")
                .default_value(DEFAULT_REFRESH_COOKIE_NAME),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark cookies Secure (forced off in local mode)")
                .env("COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAMESITE)
                .long(ARG_COOKIE_SAMESITE)
                .help("SameSite attribute: lax, strict or none")
                .env("COOKIE_SAMESITE")
                .default_value("lax")
                .value_parser(|value: &str| value.parse::<SameSite>()),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Cookie Domain attribute (ignored in local mode)")
                .env("COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_ACCESS_MAX_AGE)
                .long(ARG_ACCESS_MAX_AGE)
                .help("Access cookie Max-Age in seconds")
                .env("ACCESS_MAX_AGE")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_MAX_AGE)
                .long(ARG_REFRESH_MAX_AGE)
                .help("Refresh cookie Max-Age in seconds")
                .env("REFRESH_MAX_AGE")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
}
