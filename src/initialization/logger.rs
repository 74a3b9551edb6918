//! Logger initialization.
//!
//! Content script, background and CLI all log through one process-wide
//! `log` facade. Each line is tagged with the execution context its module
//! belongs to, so a scan's interleaved output can be told apart.

use std::io::Write;

use colored::*;
use log::{Level, LevelFilter};
use serde::Serialize;

use crate::config::LogFormat;
use crate::error_handling::InitializationError;

/// Execution context a log target belongs to.
fn context_of(target: &str) -> &'static str {
    let module = target
        .strip_prefix("media_guard::")
        .and_then(|rest| rest.split("::").next());
    match module {
        Some("scanner" | "early_blur" | "dom") => "content",
        Some("background") => "background",
        Some("messaging") => "runtime",
        Some("detection" | "storage") => "shared",
        Some(_) => "cli",
        None if target == "media_guard" => "cli",
        None => "deps",
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: i64,
    level: &'a str,
    context: &'a str,
    target: &'a str,
    msg: String,
}

fn json_line(ts: i64, level: Level, target: &str, msg: String) -> String {
    let line = JsonLine {
        ts,
        level: level.as_str(),
        context: context_of(target),
        target,
        msg,
    };
    serde_json::to_string(&line).unwrap_or_default()
}

fn plain_line(level: Level, target: &str, msg: &std::fmt::Arguments<'_>) -> String {
    let colored_level = match level {
        Level::Error => level.as_str().red(),
        Level::Warn => level.as_str().yellow(),
        Level::Info => level.as_str().green(),
        Level::Debug => level.as_str().blue(),
        Level::Trace => level.as_str().purple(),
    };
    let context = match context_of(target) {
        "content" => "content".magenta(),
        "background" => "background".cyan(),
        other => other.dimmed(),
    };
    format!("{:<5} [{}] {}", colored_level, context, msg)
}

/// Initializes the logger with the specified level and format.
///
/// `RUST_LOG` is read first and `level` overrides it for this crate, so
/// `RUST_LOG=reqwest=debug` still works alongside `--log-level`.
///
/// # Errors
///
/// Returns `InitializationError::LoggerError` if a logger is already installed.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=reqwest=debug media_guard page.html --log-level info
/// media_guard page.html --log-format json | jq 'select(.context == "content")'
/// ```
pub fn init_logger_with(level: LevelFilter, format: LogFormat) -> Result<(), InitializationError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    // html5ever reports every recoverable parse error in fragments we insert
    builder.filter_module("html5ever", LevelFilter::Error);
    builder.filter_module("selectors", LevelFilter::Warn);
    builder.filter_module("hyper_util", LevelFilter::Info);
    builder.filter_module("media_guard", level);

    match format {
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{}",
                    json_line(
                        chrono::Utc::now().timestamp_millis(),
                        record.level(),
                        record.target(),
                        record.args().to_string(),
                    )
                )
            });
        }
        LogFormat::Plain => {
            colored::control::set_override(true);
            builder.format(|buf, record| {
                writeln!(buf, "{}", plain_line(record.level(), record.target(), record.args()))
            });
        }
    }

    // try_init so that tests installing a logger twice get an error, not a panic
    builder.try_init().map_err(InitializationError::from)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_of_module_targets() {
        assert_eq!(context_of("media_guard::scanner"), "content");
        assert_eq!(context_of("media_guard::early_blur"), "content");
        assert_eq!(context_of("media_guard::background::stats"), "background");
        assert_eq!(context_of("media_guard::messaging::runtime"), "runtime");
        assert_eq!(context_of("media_guard::detection::client"), "shared");
        assert_eq!(context_of("media_guard::run"), "cli");
        assert_eq!(context_of("media_guard"), "cli");
        assert_eq!(context_of("reqwest::connect"), "deps");
    }

    #[test]
    fn test_json_line_carries_context() {
        let line = json_line(
            1_700_000_000_000,
            Level::Warn,
            "media_guard::scanner",
            "Extension was \"reloaded\"".to_string(),
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["ts"], 1_700_000_000_000i64);
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["context"], "content");
        assert_eq!(value["target"], "media_guard::scanner");
        assert_eq!(value["msg"], "Extension was \"reloaded\"");
    }

    #[test]
    fn test_plain_line_shows_context_and_message() {
        // Colour codes depend on the process-wide override, so match the parts
        let line = plain_line(
            Level::Info,
            "media_guard::background",
            &format_args!("Blocked {} images", 3),
        );
        assert!(line.contains("INFO"));
        assert!(line.contains("background"));
        assert!(line.ends_with("] Blocked 3 images"));
    }

    #[test]
    fn test_second_initialization_reports_error() {
        // Only one logger may be installed per process; whichever call comes
        // first wins and the other one must fail without panicking.
        let first = init_logger_with(LevelFilter::Warn, LogFormat::Json);
        let second = init_logger_with(LevelFilter::Debug, LogFormat::Plain);
        assert!(first.is_err() || second.is_err());
        assert!(matches!(
            second,
            Err(InitializationError::LoggerError(_)) | Ok(())
        ));
    }
}
