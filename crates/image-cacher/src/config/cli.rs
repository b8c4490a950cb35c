use clap::Parser;
use utils::version;

use crate::config::daemon::DaemonArgs;

/// Pre-pulls container images on every node by keeping a DaemonSet of them
/// alive, once per impersonated user.
#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(flatten)]
    pub daemon: DaemonArgs,
}
