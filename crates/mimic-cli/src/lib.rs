use mimic_core::{AppError, ErrorMetadata, LogLevel};
use mimic_processing::ValidationError;
use mimic_services::ServiceError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "mimic=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Map a command failure onto the shared error taxonomy.
pub fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast::<ServiceError>() {
        Ok(service) => service.into(),
        Err(err) => match err.downcast::<ValidationError>() {
            Ok(validation) => validation.into(),
            Err(err) => AppError::from(err),
        },
    }
}

/// One-line message shown to the user for `err`.
pub fn error_line(err: &AppError) -> String {
    let mut line = format!("error[{}]: {}", err.error_code(), err.client_message());
    if let Some(action) = err.suggested_action() {
        line.push_str(&format!(" ({})", action));
    }
    line
}

/// Log `err` at its own level, then print the user-facing line to stderr.
pub fn report_error(err: &AppError) {
    let code = err.error_code();
    let kind = err.error_type();
    let details = err.detailed_message();
    let recoverable = err.is_recoverable();
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(code, kind, error = %details, "Command rejected"),
        LogLevel::Warn => tracing::warn!(code, kind, recoverable, error = %details, "Command failed"),
        LogLevel::Error => tracing::error!(code, kind, recoverable, error = %details, "Command failed"),
    }
    eprintln!("{}", error_line(err));
}

/// Truncate to `max_chars` characters, appending "..." if truncated.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Fixed-width text bar for a 0-100 progress value.
pub fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (progress.min(100) as usize * width) / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        progress
    )
}
