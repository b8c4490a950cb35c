pub mod cli;
pub mod daemon;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;
use thiserror::Error;
use tracing::warn;

use crate::domain::workload::image_set::is_dns1123_label;
use crate::domain::workload::image_set::MAX_LABEL_LEN;
use crate::domain::workload::ImageSet;

pub use cli::*;
pub use daemon::*;

/// Longest caching interval accepted, one year.
pub const MAX_CACHING_INTERVAL_HOURS: u64 = 24 * 365;

const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No valid image entries were configured")]
    NoImages,
    #[error("No users to impersonate were configured")]
    NoIdentities,
    #[error("Token exchange needs a service account id, secret and OIDC provider together")]
    IncompleteTokenExchange,
    #[error("'{name}' is not a valid lowercase RFC 1123 name")]
    InvalidName { name: String },
    #[error("User '{identity}' cannot be turned into a DaemonSet name suffix")]
    InvalidIdentity { identity: String },
    #[error("Several users map to the DaemonSet name '{name}'")]
    DuplicateWorkloadName { name: String },
    #[error("Caching interval of {hours} hours exceeds the maximum of {MAX_CACHING_INTERVAL_HOURS}")]
    IntervalTooLarge { hours: u64 },
}

/// Client credentials exchanged for a bearer token at start-up.
#[derive(Clone)]
pub struct TokenExchange {
    pub client_id: String,
    pub client_secret: String,
    pub provider_url: String,
}

impl fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExchange")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("provider_url", &self.provider_url)
            .finish()
    }
}

/// How the base API server credential is obtained.
#[derive(Debug, Clone, Default)]
pub struct CredentialConfig {
    pub kubeconfig: Option<PathBuf>,
    pub proxy_url: Option<String>,
    pub token_exchange: Option<TokenExchange>,
}

/// A user to impersonate and the DaemonSet its session owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub workload_name: String,
}

/// Validated daemon configuration. Built once from the command line and
/// passed down explicitly; nothing reads the environment afterwards.
#[derive(Debug, Clone)]
pub struct CacherConfig {
    pub namespace: String,
    pub images: ImageSet,
    pub identities: Vec<Identity>,
    pub caching_interval: Duration,
    pub idle_image: String,
    pub credentials: CredentialConfig,
}

impl CacherConfig {
    /// Validates raw arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when no image or identity survives parsing,
    /// when names are not valid object names, or when the token exchange
    /// settings are only partially given.
    pub fn from_args(args: &DaemonArgs) -> Result<Self, Report<ConfigError>> {
        validate_name(&args.daemonset_name)?;
        validate_name(&args.namespace)?;

        let caching_interval = caching_interval(args.caching_interval_hours)?;

        let images = ImageSet::parse(&args.images);
        if images.is_empty() {
            return Err(Report::new(ConfigError::NoImages)
                .attach_printable(format!("IMAGES was '{}'", args.images)));
        }

        let usernames = dedup_users(&args.impersonate_users);
        if usernames.is_empty() {
            return Err(Report::new(ConfigError::NoIdentities));
        }

        let mut identities = Vec::with_capacity(usernames.len());
        let mut names = HashSet::new();
        for username in usernames {
            let workload_name = if args.per_identity_names {
                workload_name_for(&args.daemonset_name, &username)?
            } else {
                args.daemonset_name.clone()
            };
            if args.per_identity_names && !names.insert(workload_name.clone()) {
                return Err(Report::new(ConfigError::DuplicateWorkloadName {
                    name: workload_name,
                }));
            }
            identities.push(Identity {
                username,
                workload_name,
            });
        }

        let token_exchange = match (
            &args.service_account_id,
            &args.service_account_secret,
            &args.oidc_provider,
        ) {
            (None, None, None) => None,
            (Some(client_id), Some(client_secret), Some(provider_url)) => Some(TokenExchange {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                provider_url: provider_url.clone(),
            }),
            _ => return Err(Report::new(ConfigError::IncompleteTokenExchange)),
        };

        Ok(Self {
            namespace: args.namespace.clone(),
            images,
            identities,
            caching_interval,
            idle_image: args.idle_image.clone(),
            credentials: CredentialConfig {
                kubeconfig: args.kubeconfig.clone(),
                proxy_url: args.proxy_url.clone().filter(|u| !u.trim().is_empty()),
                token_exchange,
            },
        })
    }
}

fn caching_interval(hours: u64) -> Result<Duration, Report<ConfigError>> {
    if hours > MAX_CACHING_INTERVAL_HOURS {
        return Err(Report::new(ConfigError::IntervalTooLarge { hours }));
    }
    hours
        .checked_mul(SECONDS_PER_HOUR)
        .map(Duration::from_secs)
        .ok_or_else(|| Report::new(ConfigError::IntervalTooLarge { hours }))
}

/// Trims users, drops blanks and keeps the first of any duplicates.
fn dedup_users(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for user in raw.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        if seen.insert(user) {
            users.push(user.to_string());
        } else {
            warn!(user, "Duplicate user to impersonate, ignoring");
        }
    }
    users
}

/// `<base>-<user>` with the user reduced to characters allowed in a name,
/// truncated to the maximum name length.
pub fn workload_name_for(base: &str, username: &str) -> Result<String, Report<ConfigError>> {
    let mut suffix = String::with_capacity(username.len());
    for c in username.chars().map(|c| c.to_ascii_lowercase()) {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if !(c == '-' && suffix.ends_with('-')) {
            suffix.push(c);
        }
    }
    let suffix = suffix.trim_matches('-');
    if suffix.is_empty() {
        return Err(Report::new(ConfigError::InvalidIdentity {
            identity: username.to_string(),
        }));
    }

    let mut name = format!("{base}-{suffix}");
    name.truncate(MAX_LABEL_LEN);
    let name = name.trim_end_matches('-').to_string();
    validate_name(&name)?;
    Ok(name)
}

fn validate_name(name: &str) -> Result<(), Report<ConfigError>> {
    if is_dns1123_label(name) {
        Ok(())
    } else {
        Err(Report::new(ConfigError::InvalidName {
            name: name.to_string(),
        }))
    }
}
