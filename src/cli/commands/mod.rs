pub mod cookies;
pub mod email;
pub mod logging;
pub mod rate_limit;
pub mod supabase;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

use crate::api::handlers::auth::DeploymentMode;

pub const ARG_PORT: &str = "port";
pub const ARG_ENV: &str = "env";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("affitti")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("AFFITTI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENV)
                .long(ARG_ENV)
                .help("Deployment mode: local, dev, development, staging, prod or production")
                .long_help(
                    "Deployment mode. Local modes force cookies to be non-Secure, SameSite=Lax and host-only so the frontend works over plain HTTP.",
                )
                .env("ENV")
                .default_value("production")
                .value_parser(|value: &str| value.parse::<DeploymentMode>()),
        );

    let command = supabase::with_args(command);
    let command = cookies::with_args(command);
    let command = rate_limit::with_args(command);
    let command = email::with_args(command);
    logging::with_args(command)
}
