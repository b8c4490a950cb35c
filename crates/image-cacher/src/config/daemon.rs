use std::path::PathBuf;

use clap::Parser;

use super::MAX_CACHING_INTERVAL_HOURS;
use crate::domain::workload::builder::DEFAULT_IDLE_IMAGE;

#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "DAEMONSET_NAME",
        help = "Name of the image caching DaemonSet"
    )]
    pub daemonset_name: String,

    #[arg(
        long,
        env = "NAMESPACE",
        help = "Namespace the DaemonSet is created in"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "IMAGES",
        help = "Images to cache as 'name=image' pairs separated by ';', e.g. web=nginx:1.25;db=postgres:16"
    )]
    pub images: String,

    #[arg(
        long,
        env = "IMPERSONATE_USERS",
        value_delimiter = ',',
        help = "Comma separated users to impersonate, one DaemonSet per user"
    )]
    pub impersonate_users: Vec<String>,

    #[arg(
        long,
        env = "CACHING_INTERVAL_HOURS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_CACHING_INTERVAL_HOURS),
        help = "Hours between checks that the DaemonSet still exists, at most one year"
    )]
    pub caching_interval_hours: u64,

    #[arg(
        long,
        env = "IDLE_IMAGE",
        default_value = DEFAULT_IDLE_IMAGE,
        help = "Image of the container that idles once the images are pulled"
    )]
    pub idle_image: String,

    #[arg(
        long,
        env = "PER_IDENTITY_WORKLOAD_NAMES",
        help = "Suffix the DaemonSet name with each impersonated user",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub per_identity_names: bool,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "OPENSHIFT_PROXY_URL",
        value_hint = clap::ValueHint::Url,
        help = "API server URL overriding the one from the kubeconfig"
    )]
    pub proxy_url: Option<String>,

    #[arg(
        long,
        env = "SERVICE_ACCOUNT_ID",
        help = "Client id used to exchange client credentials for a bearer token"
    )]
    pub service_account_id: Option<String>,

    #[arg(
        long,
        env = "SERVICE_ACCOUNT_SECRET",
        hide_env_values = true,
        help = "Client secret used to exchange client credentials for a bearer token"
    )]
    pub service_account_secret: Option<String>,

    #[arg(
        long,
        env = "OIDC_PROVIDER",
        value_hint = clap::ValueHint::Url,
        help = "Base URL of the OIDC provider serving the /token endpoint"
    )]
    pub oidc_provider: Option<String>,
}
