use colored::Colorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Step,
    Info,
    Success,
    Warning,
    Error,
}

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_level(false)
        .with_target(false)
        .compact();

    tracing_subscriber::fmt()
        .event_format(format)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub fn log(level: LogLevel, message: &str) {
    let prefix = match level {
        LogLevel::Step => format!("[ {} ]   ", "STEP".magenta().bold()),
        LogLevel::Info => format!("[ {} ]   ", "INFO".cyan().bold()),
        LogLevel::Success => format!("[ {} ]", "SUCCESS".green().bold()),
        LogLevel::Warning => format!("[ {} ]", "WARNING".yellow().bold()),
        LogLevel::Error => format!("[ {} ]  ", "ERROR".red().bold()),
    };

    match level {
        LogLevel::Warning => tracing::warn!("{} {}", prefix, message),
        LogLevel::Error => tracing::error!("{} {}", prefix, message),
        _ => tracing::info!("{} {}", prefix, message),
    }
}

/// Call-scoped trace buffer. Every control-surface operation returns the
/// accumulated lines to the caller alongside its structured result, mirroring
/// what the operator sees in the progress panel.
#[derive(Debug, Default)]
pub struct ImportLog {
    lines: Vec<String>,
    verbose: bool,
}

impl ImportLog {
    pub fn new(verbose: bool) -> Self {
        ImportLog {
            lines: Vec::new(),
            verbose,
        }
    }

    pub fn push<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        log(LogLevel::Info, &message);
        self.lines.push(message);
    }

    /// Extra trace detail, recorded only when `verbose_log` is enabled.
    pub fn debug<S: Into<String>>(&mut self, message: S) {
        if self.verbose {
            self.push(message);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
