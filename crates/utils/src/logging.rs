//! provides logging helpers

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Environment variable naming a log file; logs go to stdout when unset.
pub const LOG_PATH_ENV_VAR: &str = "IMAGE_CACHER_LOG_PATH";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Builds the human readable fmt layer.
///
/// With a `log_path` the layer writes to a daily rotated file through a
/// non-blocking writer; the returned guard must be kept alive for as long as
/// logs should be flushed. Without one (or if the file cannot be opened) the
/// layer writes to stdout.
pub fn get_fmt_layer<S>(log_path: Option<String>) -> (BoxedLayer<S>, Option<WorkerGuard>)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Some(log_path) = log_path.filter(|p| !p.trim().is_empty()) else {
        return (stdout_layer(), None);
    };

    match rolling_appender(Path::new(&log_path)) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .boxed();
            (layer, Some(guard))
        }
        Err(err) => {
            // no subscriber is installed yet, so this cannot go through tracing
            eprintln!("failed to open log file {log_path}: {err}, logging to stdout");
            (stdout_layer(), None)
        }
    }
}

fn stdout_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .boxed()
}

fn rolling_appender(
    path: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image-cacher.log".to_string());

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(3)
        .build(dir)
}
