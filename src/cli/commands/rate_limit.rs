use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};

use crate::api::rate_limit::{DEFAULT_PROTECTED_PATHS, RateLimitConfig, parse_paths};

pub const ARG_RL_WINDOW_SEC: &str = "rl-window-sec";
pub const ARG_RL_MAX_REQ: &str = "rl-max-req";
pub const ARG_RL_PATHS: &str = "rl-paths";
pub const ARG_RL_SWEEP_SECONDS: &str = "rl-sweep-seconds";
pub const ARG_RL_TRUST_FORWARDED: &str = "rl-trust-forwarded";

#[derive(Debug, Clone)]
pub struct Options {
    pub config: RateLimitConfig,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let mut config = RateLimitConfig::new();
        if let Some(seconds) = matches.get_one::<u64>(ARG_RL_WINDOW_SEC) {
            config = config.with_window_seconds(*seconds);
        }
        if let Some(max) = matches.get_one::<u32>(ARG_RL_MAX_REQ) {
            config = config.with_max_requests(*max);
        }
        if let Some(paths) = matches.get_one::<String>(ARG_RL_PATHS) {
            config = config.with_protected_paths(parse_paths(paths));
        }
        if let Some(seconds) = matches.get_one::<u64>(ARG_RL_SWEEP_SECONDS) {
            config = config.with_sweep_seconds(*seconds);
        }
        Self {
            config: config.with_trust_forwarded(matches.get_flag(ARG_RL_TRUST_FORWARDED)),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RL_WINDOW_SEC)
                .long(ARG_RL_WINDOW_SEC)
                .help("Rate limit window in seconds")
                .env("RL_WINDOW_SEC")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RL_MAX_REQ)
                .long(ARG_RL_MAX_REQ)
                .help("Requests allowed per client and path within one window")
                .env("RL_MAX_REQ")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RL_PATHS)
                .long(ARG_RL_PATHS)
                .help("Comma separated path prefixes to rate limit")
                .env("RL_PATHS")
                .default_value(DEFAULT_PROTECTED_PATHS),
        )
        .arg(
            Arg::new(ARG_RL_SWEEP_SECONDS)
                .long(ARG_RL_SWEEP_SECONDS)
                .help("Interval for pruning expired buckets, 0 disables the sweeper")
                .env("RL_SWEEP_SEC")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RL_TRUST_FORWARDED)
                .long(ARG_RL_TRUST_FORWARDED)
                .help("Key clients by the first X-Forwarded-For hop (only behind a trusted proxy)")
                .env("RL_TRUST_FORWARDED")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
