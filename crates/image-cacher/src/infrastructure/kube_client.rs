use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::info;

use crate::config::CredentialConfig;
use crate::config::Identity;
use crate::infrastructure::credentials;
use crate::infrastructure::k8s::KubernetesError;

/// Resolves the shared base configuration every identity's client is
/// derived from: kubeconfig (or in-cluster) inference, the optional proxy
/// URL and the optional exchanged bearer token.
pub async fn base_config(
    credentials: &CredentialConfig,
) -> Result<Config, Report<KubernetesError>> {
    let mut config = match &credentials.kubeconfig {
        Some(path) => from_kubeconfig(path).await?,
        None => {
            // in-cluster config first, then ~/.kube/config
            Config::infer()
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: "Failed to infer Kubernetes client configuration".to_string(),
                })?
        }
    };

    if let Some(proxy_url) = &credentials.proxy_url {
        info!("Sending API requests through {proxy_url}");
        config.cluster_url = match proxy_url.parse() {
            Ok(url) => url,
            Err(e) => {
                return Err(
                    Report::new(e).change_context(KubernetesError::ConnectionFailed {
                        message: format!("Invalid proxy URL: {proxy_url}"),
                    }),
                );
            }
        };
    }

    if let Some(exchange) = &credentials.token_exchange {
        let token = credentials::exchange_token(&reqwest::Client::new(), exchange)
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to obtain a bearer token".to_string(),
            })?;
        config.auth_info.token = token.parse().ok();
        config.auth_info.token_file = None;
    }

    Ok(config)
}

async fn from_kubeconfig(path: &Path) -> Result<Config, Report<KubernetesError>> {
    let kubeconfig =
        Kubeconfig::read_from(path).change_context_lazy(|| KubernetesError::ConnectionFailed {
            message: format!("Failed to read kubeconfig file: {}", path.display()),
        })?;

    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context_lazy(|| KubernetesError::ConnectionFailed {
            message: format!(
                "Failed to create config from kubeconfig: {}",
                path.display()
            ),
        })
}

/// Builds a client that impersonates `identity` on top of `base`.
pub fn impersonated_client(
    base: &Config,
    identity: &Identity,
) -> Result<Client, Report<KubernetesError>> {
    let mut config = base.clone();
    config.auth_info.impersonate = Some(identity.username.clone());

    Client::try_from(config).change_context_lazy(|| KubernetesError::ConnectionFailed {
        message: format!(
            "Failed to create Kubernetes client impersonating {}",
            identity.username
        ),
    })
}
