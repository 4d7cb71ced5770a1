//! Deployment mode and cookie policy resolution.

use secrecy::SecretString;
use std::{fmt, str::FromStr};

pub const DEFAULT_ACCESS_COOKIE_NAME: &str = "access_token";
pub const DEFAULT_REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const DEFAULT_ACCESS_MAX_AGE: u64 = 15 * 60;
pub const DEFAULT_REFRESH_MAX_AGE: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_RESET_URL: &str = "http://localhost:3000/reset";

/// Where the service runs; `Local` relaxes cookie security for plain HTTP.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    Local,
    #[default]
    Production,
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Self::Local),
            "prod" | "production" | "staging" => Ok(Self::Production),
            other => Err(format!("invalid environment: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            other => Err(format!("invalid SameSite value: {other}")),
        }
    }
}

/// Cookie settings as configured, before the deployment mode is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieSettings {
    pub access_name: String,
    pub refresh_name: String,
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
    pub access_max_age: u64,
    pub refresh_max_age: u64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            access_name: DEFAULT_ACCESS_COOKIE_NAME.to_string(),
            refresh_name: DEFAULT_REFRESH_COOKIE_NAME.to_string(),
            secure: false,
            same_site: SameSite::Lax,
            domain: None,
            access_max_age: DEFAULT_ACCESS_MAX_AGE,
            refresh_max_age: DEFAULT_REFRESH_MAX_AGE,
        }
    }
}

/// Effective cookie attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookiePolicy {
    access_name: String,
    refresh_name: String,
    secure: bool,
    same_site: SameSite,
    domain: Option<String>,
    access_max_age: u64,
    refresh_max_age: u64,
}

impl CookiePolicy {
    /// Apply the deployment mode to the configured settings.
    ///
    /// `Local` always wins: `SameSite=Lax`, not `Secure`, no domain. Otherwise
    /// `SameSite=None` forces `Secure`.
    #[must_use]
    pub fn resolve(mode: DeploymentMode, settings: CookieSettings) -> Self {
        let CookieSettings {
            access_name,
            refresh_name,
            secure,
            same_site,
            domain,
            access_max_age,
            refresh_max_age,
        } = settings;

        let (secure, same_site, domain) = match mode {
            DeploymentMode::Local => (false, SameSite::Lax, None),
            DeploymentMode::Production => (
                secure || same_site == SameSite::None,
                same_site,
                domain.filter(|domain| !domain.trim().is_empty()),
            ),
        };

        Self {
            access_name,
            refresh_name,
            secure,
            same_site,
            domain,
            access_max_age,
            refresh_max_age,
        }
    }

    #[must_use]
    pub fn access_name(&self) -> &str {
        &self.access_name
    }

    #[must_use]
    pub fn refresh_name(&self) -> &str {
        &self.refresh_name
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    #[must_use]
    pub fn access_max_age(&self) -> u64 {
        self.access_max_age
    }

    #[must_use]
    pub fn refresh_max_age(&self) -> u64 {
        self.refresh_max_age
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self::resolve(DeploymentMode::Production, CookieSettings::default())
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    mode: DeploymentMode,
    cookies: CookiePolicy,
    reset_url: String,
    jwt_secret: Option<SecretString>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(mode: DeploymentMode, cookies: CookieSettings) -> Self {
        Self {
            mode,
            cookies: CookiePolicy::resolve(mode, cookies),
            reset_url: DEFAULT_RESET_URL.to_string(),
            jwt_secret: None,
        }
    }

    #[must_use]
    pub fn with_reset_url(mut self, reset_url: String) -> Self {
        self.reset_url = reset_url;
        self
    }

    /// Enables local HS256 verification of access tokens.
    #[must_use]
    pub fn with_jwt_secret(mut self, secret: Option<SecretString>) -> Self {
        self.jwt_secret = secret;
        self
    }

    #[must_use]
    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    #[must_use]
    pub fn cookies(&self) -> &CookiePolicy {
        &self.cookies
    }

    #[must_use]
    pub fn reset_url(&self) -> &str {
        &self.reset_url
    }

    pub(crate) fn jwt_secret(&self) -> Option<&SecretString> {
        self.jwt_secret.as_ref()
    }
}
