use std::io::Write;
use std::sync::Mutex;

use console::style;
use once_cell::sync::Lazy;

use crate::model::{LogKind, RequestLog};

/// Ambient process logging, grounded on the teacher's
/// `logging::init_env_logger` (`logging/mod.rs`): a plain `env_logger`
/// builder driven by the configured level, used for startup/shutdown
/// messages and plugin-fault reports (`error::LoggingErrorSink`).
pub fn init_env_logger(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(level);
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Serializes the human-facing "boxed" request/response log entries
/// (`spec.md` §4.5/§9) behind a single mutex so concurrent sessions
/// never interleave a multi-line box. Grounded on
/// `mockforge-cli/src/progress.rs`'s use of `console::style` for colored
/// terminal output.
static CONSOLE: Lazy<Mutex<std::io::Stdout>> = Lazy::new(|| Mutex::new(std::io::stdout()));

pub fn print_boxed(entry: &RequestLog) {
    let guard = CONSOLE.lock().expect("console mutex poisoned");
    let mut out = guard.lock();
    let header = match entry.kind {
        LogKind::RequestIntercepted => style("intercepted").cyan(),
        LogKind::ResponseFromOrigin => style("passed through").green(),
        LogKind::ResponseMocked => style("mocked").yellow(),
        LogKind::Warning => style("warning").yellow().bold(),
        LogKind::Error => style("error").red().bold(),
    };
    let title = match (&entry.method, &entry.url) {
        (Some(method), Some(url)) => format!("{header}  {method} {url}"),
        _ => header.to_string(),
    };
    let _ = writeln!(out, "┌─ {title}");
    for line in &entry.message_lines {
        let _ = writeln!(out, "│  {line}");
    }
    let _ = writeln!(out, "└─");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_boxed_does_not_panic_on_minimal_entry() {
        let entry = RequestLog::new(LogKind::Warning, vec!["no method or url set".to_string()]);
        print_boxed(&entry);
    }
}
