mod config;

pub use self::config::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

type Output = Box<dyn Layer<Registry> + Send + Sync>;

fn build_filter(config: &TelemetryConfig) -> EnvFilter {
    let mut builder =
        EnvFilter::builder().with_default_directive(LevelFilter::from(config.max_level).into());
    if !config.level_filter_env.is_empty() {
        builder = builder.with_env_var(&config.level_filter_env);
    }
    if config.level_filter.is_empty() {
        builder.from_env_lossy()
    } else {
        builder.parse_lossy(&config.level_filter)
    }
}

fn output<W>(writer: W, ansi: bool, verbose: bool) -> Output
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_thread_ids(verbose)
        .with_target(verbose)
        .boxed()
}

fn outputs(config: &TelemetryConfig) -> Vec<Output> {
    let mut outputs = vec![];
    if config.console.enable {
        outputs.push(output(std::io::stdout, true, config.console.verbose));
    }
    if config.file.enable {
        let file = &config.file;
        let appender =
            RollingFileAppender::new(file.rolling_time.into(), &file.path, &file.prefix);
        outputs.push(output(appender, false, file.verbose));
    }
    outputs
}

/// Installs the global subscriber.
pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !config.enable {
        return Ok(());
    }
    Registry::default()
        .with(outputs(config))
        .with(build_filter(config))
        .try_init()?;
    Ok(())
}
