use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::{
    email::SmtpConfig,
    handlers::auth::{normalize_email, valid_email},
};

pub const ARG_FRONTEND_PROD: &str = "frontend-prod";
pub const ARG_FRONTEND_RESET_URL: &str = "frontend-reset-url";
pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USER: &str = "smtp-user";
pub const ARG_SMTP_PASS: &str = "smtp-pass";
pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_ADMIN_NOTIFY_EMAILS: &str = "admin-notify-emails";

const FALLBACK_SENDER: &str = "no-reply@example.com";

/// Frontend links and outgoing mail.
#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_prod: String,
    pub reset_url: String,
    /// `None` when SMTP host or user is missing; mail is then only logged.
    pub smtp: Option<SmtpConfig>,
    pub admin_recipients: Vec<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if an admin recipient is not a valid email address.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let smtp = match (read(ARG_SMTP_HOST), read(ARG_SMTP_USER)) {
            (Some(host), Some(user)) => Some(SmtpConfig {
                host,
                port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
                from: read(ARG_EMAIL_FROM)
                    .or_else(|| user.contains('@').then(|| user.clone()))
                    .unwrap_or_else(|| FALLBACK_SENDER.to_string()),
                password: SecretString::from(read(ARG_SMTP_PASS).unwrap_or_default()),
                user,
            }),
            _ => None,
        };

        Ok(Self {
            frontend_prod: read(ARG_FRONTEND_PROD).unwrap_or_default(),
            reset_url: read(ARG_FRONTEND_RESET_URL).unwrap_or_default(),
            smtp,
            admin_recipients: parse_recipients(
                read(ARG_ADMIN_NOTIFY_EMAILS).as_deref().unwrap_or_default(),
            )?,
        })
    }
}

fn parse_recipients(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            let email = normalize_email(value);
            if valid_email(&email) {
                Ok(email)
            } else {
                Err(anyhow!("invalid admin notification address: {value}"))
            }
        })
        .collect()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_PROD)
                .long(ARG_FRONTEND_PROD)
                .help("Production frontend origin allowed by CORS")
                .env("FRONTEND_PROD")
                .default_value("https://trusty-rent.vercel.app"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_RESET_URL)
                .long(ARG_FRONTEND_RESET_URL)
                .help("Page the password recovery email links to")
                .env("FRONTEND_RESET_URL")
                .default_value("http://localhost:3000/reset"),
        )
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; without it notifications are only logged")
                .env("SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port (STARTTLS)")
                .env("SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USER)
                .long(ARG_SMTP_USER)
                .help("SMTP username")
                .env("SMTP_USER"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASS)
                .long(ARG_SMTP_PASS)
                .help("SMTP password")
                .env("SMTP_PASS")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address, defaults to the SMTP user when it is an address")
                .env("EMAIL_FROM"),
        )
        .arg(
            Arg::new(ARG_ADMIN_NOTIFY_EMAILS)
                .long(ARG_ADMIN_NOTIFY_EMAILS)
                .help("Comma separated admins notified of new approval requests")
                .env("ADMIN_NOTIFY_EMAILS"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_normalized() {
        let parsed = parse_recipients(" Admin@Example.com, ,ops@example.com ").ok();
        assert_eq!(
            parsed,
            Some(vec![
                "admin@example.com".to_string(),
                "ops@example.com".to_string()
            ])
        );
    }

    #[test]
    fn recipients_reject_garbage() {
        assert!(parse_recipients("admin@example.com,not-an-email").is_err());
        assert_eq!(parse_recipients("").ok(), Some(Vec::new()));
    }
}
