fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    const ENV_FILTER: &str = "TILESTREAM_LOG_FILTER";
    const ENV_TRACE_DEPS: &str = "TILESTREAM_TRACE_DEPS";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Install the global subscriber. Later calls are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let (env_filter, throttled_deps) = build_env_filter(config.level.to_filter());
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_level(true)
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;
        let _ = GUARD.set(guard);

        if throttled_deps {
            tracing::info!(
                "suppressing dependency trace noise; set {ENV_TRACE_DEPS}=1 or {ENV_FILTER} to override"
            );
        }
        Ok(())
    }

    fn build_env_filter(level: LevelFilter) -> (EnvFilter, bool) {
        if let Ok(filter) = std::env::var(ENV_FILTER) {
            return (EnvFilter::new(filter), false);
        }
        let (filter, throttled) = default_filter_for(level, allow_dependency_traces());
        (EnvFilter::new(filter), throttled)
    }

    const TRACE_DEP_TARGETS: &[&str] = &["tokio_tungstenite", "tungstenite", "rustls", "mio"];

    fn default_filter_for(level: LevelFilter, allow_deps: bool) -> (String, bool) {
        let base = match level {
            LevelFilter::TRACE => "info,tilestream=trace,tilestream_client_core=trace,tile_proto=trace",
            LevelFilter::DEBUG => "info,tilestream=debug,tilestream_client_core=debug,tile_proto=debug",
            LevelFilter::INFO => "info",
            LevelFilter::WARN => "warn",
            LevelFilter::ERROR => "error",
            LevelFilter::OFF => "off",
        };
        if level == LevelFilter::TRACE && !allow_deps {
            let mut filter = base.to_owned();
            for target in TRACE_DEP_TARGETS {
                filter.push(',');
                filter.push_str(target);
                filter.push_str("=info");
            }
            (filter, true)
        } else {
            (base.to_owned(), false)
        }
    }

    fn allow_dependency_traces() -> bool {
        super::env_truthy(ENV_TRACE_DEPS).unwrap_or(false)
    }

    /// Offset, hex and printable columns, 16 bytes per line.
    pub fn hexdump(bytes: &[u8]) -> String {
        const WIDTH: usize = 16;
        let mut out = String::new();
        for (i, chunk) in bytes.chunks(WIDTH).enumerate() {
            use std::fmt::Write as _;
            let offset = i * WIDTH;
            let _ = write!(out, "{offset:08x}  ");
            for (j, byte) in chunk.iter().enumerate() {
                if j == WIDTH / 2 {
                    out.push(' ');
                }
                let _ = write!(out, "{byte:02x} ");
            }
            for _ in chunk.len()..WIDTH {
                out.push_str("   ");
            }
            out.push(' ');
            for &byte in chunk {
                let ch = if (0x20..=0x7e).contains(&byte) {
                    byte as char
                } else {
                    '.'
                };
                out.push(ch);
            }
            out.push('\n');
        }
        out
    }

}
