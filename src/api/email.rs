//! Notification email.
//!
//! Two domain messages exist: admins hear about every profile submitted for
//! approval, and users hear about the decision. Messages are handed to an
//! `EmailSender` on a blocking task so SMTP latency never reaches the request;
//! delivery failures are logged and dropped.
//!
//! `LogEmailSender` is used whenever SMTP is not configured.

use anyhow::{Context, Result};
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, info_span};

use crate::supabase::models::{AccountKind, ApprovalStatus, Profile};

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);
const SUBJECT_PREFIX: &str = "[TrustyRent]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to.join(", "),
            subject = %message.subject,
            "email delivery disabled, message logged"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("from", &self.from)
            .finish()
    }
}

/// STARTTLS relay with username/password credentials.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// # Errors
    /// Returns an error if the relay or the sender address is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::starttls_relay(&config.host)
            .with_context(|| format!("Invalid SMTP relay: {}", config.host))?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        let from = config
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid sender address: {}", config.from))?;
        Ok(Self { transport, from })
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for recipient in &message.to {
            let mailbox = recipient
                .parse::<Mailbox>()
                .with_context(|| format!("Invalid recipient: {recipient}"))?;
            builder = builder.to(mailbox);
        }
        let email = builder
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .context("Failed to build email")?;
        self.transport
            .send(&email)
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Renders and dispatches the domain notifications.
pub struct Notifier {
    sender: Arc<dyn EmailSender>,
    admin_recipients: Vec<String>,
}

impl Notifier {
    #[must_use]
    pub fn new(sender: Arc<dyn EmailSender>, admin_recipients: Vec<String>) -> Self {
        Self {
            sender,
            admin_recipients,
        }
    }

    /// Notifier that only logs, with no admin recipients.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(LogEmailSender), Vec::new())
    }

    #[must_use]
    pub fn signup_message(&self, profile: &Profile) -> Option<EmailMessage> {
        if self.admin_recipients.is_empty() {
            return None;
        }
        let id = profile.id.as_deref().unwrap_or_default();
        let email = profile.email.as_deref().unwrap_or_default();
        let kind = profile.kind.unwrap_or(AccountKind::Individual).as_str();
        let company = profile.company_name.as_deref().unwrap_or("-");

        let text = format!(
            "Ciao Admin,\n\n\
             è stata inviata una nuova richiesta di approvazione profilo.\n\n\
             ID: {id}\nEmail: {email}\nTipo: {kind}\nRagione sociale: {company}\n\n\
             Accedi alla dashboard admin per gestirla.\n"
        );
        let html = format!(
            "<p>Ciao Admin,</p>\
             <p>È stata inviata una nuova richiesta di approvazione profilo.</p>\
             <ul><li><b>ID:</b> {}</li><li><b>Email:</b> {}</li>\
             <li><b>Tipo:</b> {kind}</li><li><b>Ragione sociale:</b> {}</li></ul>\
             <p>Accedi alla dashboard admin per gestirla.</p>",
            escape_html(id),
            escape_html(email),
            escape_html(company)
        );
        Some(EmailMessage {
            to: self.admin_recipients.clone(),
            subject: format!("{SUBJECT_PREFIX} Nuova registrazione in approvazione ({kind})"),
            text,
            html,
        })
    }

    #[must_use]
    pub fn decision_message(
        &self,
        user_email: &str,
        status: ApprovalStatus,
        reason: Option<&str>,
    ) -> Option<EmailMessage> {
        if user_email.trim().is_empty() {
            return None;
        }
        let (subject, text, html) = if status == ApprovalStatus::Approved {
            (
                format!("{SUBJECT_PREFIX} Account approvato"),
                "Ciao,\n\nla tua richiesta è stata approvata. Ora puoi utilizzare tutte le \
                 funzionalità della piattaforma.\n\nBuon lavoro!\n"
                    .to_string(),
                "<p>Ciao,</p><p>La tua richiesta è stata <b>approvata</b>. Ora puoi utilizzare \
                 tutte le funzionalità della piattaforma.</p><p>Buon lavoro!</p>"
                    .to_string(),
            )
        } else {
            let reason = reason
                .filter(|reason| !reason.trim().is_empty())
                .unwrap_or("Non specificato.");
            (
                format!("{SUBJECT_PREFIX} Account rifiutato"),
                format!(
                    "Ciao,\n\npurtroppo la tua richiesta è stata rifiutata.\nMotivo: {reason}\n\n\
                     Se ritieni ci sia un errore, rispondi a questa email.\n"
                ),
                format!(
                    "<p>Ciao,</p><p>Purtroppo la tua richiesta è stata <b>rifiutata</b>.</p>\
                     <p><b>Motivo:</b> {}</p>\
                     <p>Se ritieni ci sia un errore, rispondi a questa email.</p>",
                    escape_html(reason)
                ),
            )
        };
        Some(EmailMessage {
            to: vec![user_email.to_string()],
            subject,
            text,
            html,
        })
    }

    pub fn notify_new_signup(&self, profile: &Profile) {
        if let Some(message) = self.signup_message(profile) {
            self.dispatch(message, "signup");
        }
    }

    pub fn notify_decision(&self, user_email: &str, status: ApprovalStatus, reason: Option<&str>) {
        if let Some(message) = self.decision_message(user_email, status, reason) {
            self.dispatch(message, "decision");
        }
    }

    fn dispatch(&self, message: EmailMessage, kind: &'static str) {
        let sender = Arc::clone(&self.sender);
        let span = info_span!("email.send", email.kind = kind);
        // Detached; the outcome is only logged.
        let _handle = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            if let Err(err) = sender.send(&message) {
                error!("Failed to send {kind} email: {err:#}");
            }
        });
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
