//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, pretty and compact output formats
//! - Module-level filtering through `EnvFilter`
//! - Redaction of credential-like fields (`api_key`, `authorization`, ...) in
//!   every output format
//! - Span contexts, so every line emitted inside a sync run carries its job id
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::time::LogLevel;
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LoggingConfig::default()
//!         .with_format(LogFormat::Pretty)
//!         .with_level(LogLevel::Debug);
//!
//!     init_logging(config).expect("Failed to initialize logging");
//!
//!     tracing::info!("Archive engine started");
//! }
//! ```
//!
//! `RUST_LOG` is not consulted; pass a custom directive string through
//! [`LoggingConfig::with_filter`] instead.

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    field::MakeExt,
    filter::EnvFilter,
    fmt::{
        format::{debug_fn, FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Crates whose events are shown at the configured level. Everything else
/// is held at `warn`.
const WORKSPACE_TARGETS: &[&str] = &[
    "bridge_traits",
    "core_runtime",
    "core_library",
    "core_sync",
    "core_service",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and span lifecycle lines
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Minimum log level for workspace crates
    pub level: LogLevel,
    /// Custom filter string (e.g., "core_sync=trace,sqlx=info")
    pub filter: Option<String>,
    /// Emit span enter/exit events
    pub enable_spans: bool,
    /// Display target module in logs
    pub display_target: bool,
    /// Display thread info
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set minimum log level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set custom filter string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enable or disable span contexts
    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    /// Enable or disable target display
    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    /// Enable or disable thread info
    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Initialize the logging system
///
/// This should be called once during application startup. Subsequent calls
/// return an error.
///
/// # Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - The filter string does not parse
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let fmt_layer = build_fmt_layer(&config, io::stdout);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn build_fmt_layer<W>(config: &LoggingConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .fmt_fields(redacting_fields())
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_span_events(span_events)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .fmt_fields(redacting_fields())
            .event_format(RedactedJson {
                display_target: config.display_target,
                display_thread_info: config.display_thread_info,
                include_spans: config.enable_spans,
            })
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .fmt_fields(redacting_fields())
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_writer(writer)
            .boxed(),
    }
}

/// Space-separated `name=value` fields with sensitive values masked
fn redacting_fields() -> impl for<'w> FormatFields<'w> + Send + Sync + 'static {
    debug_fn(write_redacted_field).delimited(" ")
}

fn write_redacted_field(
    writer: &mut Writer<'_>,
    field: &Field,
    value: &dyn fmt::Debug,
) -> fmt::Result {
    match field.name() {
        "message" => write!(writer, "{:?}", value),
        name => write!(
            writer,
            "{}={}",
            name,
            redact_if_sensitive(name, &format!("{:?}", value))
        ),
    }
}

/// One JSON object per line: timestamp, level, target, redacted fields and
/// the enclosing spans with their recorded fields
struct RedactedJson {
    display_target: bool,
    display_thread_info: bool,
    include_spans: bool,
}

impl<S, N> FormatEvent<S, N> for RedactedJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut line = Map::new();
        line.insert(
            "timestamp".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        line.insert("level".to_string(), Value::String(meta.level().to_string()));
        if self.display_target {
            line.insert("target".to_string(), Value::from(meta.target()));
        }
        if self.display_thread_info {
            if let Some(name) = std::thread::current().name() {
                line.insert("thread".to_string(), Value::from(name));
            }
        }

        let mut fields = JsonFieldMap::default();
        event.record(&mut fields);
        line.extend(fields.0);

        if self.include_spans {
            let spans: Vec<Value> = ctx
                .event_scope()
                .into_iter()
                .flat_map(|scope| scope.from_root())
                .map(|span| {
                    let extensions = span.extensions();
                    let recorded = extensions
                        .get::<FormattedFields<N>>()
                        .map(|f| f.fields.clone())
                        .unwrap_or_default();
                    serde_json::json!({ "name": span.name(), "fields": recorded })
                })
                .collect();
            if !spans.is_empty() {
                line.insert("spans".to_string(), Value::Array(spans));
            }
        }

        writeln!(writer, "{}", Value::Object(line))
    }
}

#[derive(Default)]
struct JsonFieldMap(Map<String, Value>);

impl JsonFieldMap {
    fn insert(&mut self, field: &Field, value: Value) {
        let value = if is_sensitive(field.name()) {
            Value::from(REDACTED)
        } else {
            value
        };
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonFieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        let value = match field.name() {
            "message" => value.to_string(),
            name => redact_if_sensitive(name, value),
        };
        self.insert(field, Value::String(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let filter_string = match &config.filter {
        Some(custom_filter) => custom_filter.clone(),
        None => default_filter(config.level),
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| Error::Logging(format!("invalid filter: {}", e)))
}

/// Workspace crates at `level`, noisy dependencies at `warn`.
fn default_filter(level: LogLevel) -> String {
    let level = level.as_str();
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    directives.extend(
        ["sqlx=warn", "hyper=warn", "reqwest=warn"]
            .iter()
            .map(|d| d.to_string()),
    );
    directives.insert(0, "warn".to_string());
    directives.join(",")
}

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_FIELDS: &[&str] = &[
    "token",
    "password",
    "secret",
    "api_key",
    "apikey",
    "authorization",
    "bearer",
    "cookie",
];

fn is_sensitive(field_name: &str) -> bool {
    let field_lower = field_name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f))
}

/// Mask a field value when its name looks like a credential, and mask the
/// local part of anything shaped like an email address
///
/// Applied to every field the installed subscriber writes. Also usable
/// directly where a value is folded into a message string:
///
/// ```ignore
/// use core_runtime::logging::redact_if_sensitive;
///
/// warn!("Rejected key {}", redact_if_sensitive("api_key", &key));
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    if is_sensitive(field_name) {
        REDACTED.to_string()
    } else if value.contains('@') && value.contains('.') {
        match value.find('@') {
            Some(at_pos) => format!("{}***@{}", &value[..1.min(at_pos)], REDACTED),
            None => value.to_string(),
        }
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_filter("core_sync=trace")
            .with_spans(false)
            .with_target(true)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter, Some("core_sync=trace".to_string()));
        assert!(!config.enable_spans);
        assert!(config.display_target);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("api_key", "AIza123"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("youtube_api_key", "AIza123"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("cookie", "SID=1"), "[REDACTED]");

        let redacted = redact_if_sensitive("author", "someone@example.com");
        assert!(redacted.starts_with('s'));
        assert!(redacted.contains("[REDACTED]"));

        assert_eq!(redact_if_sensitive("item_id", "dQw4w9WgXcQ"), "dQw4w9WgXcQ");
    }

    /// In-memory log sink shared with the layer under test
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs(format: LogFormat) -> String {
        let capture = Capture::default();
        let config = LoggingConfig::default().with_format(format);
        let subscriber = Registry::default().with(build_fmt_layer(&config, capture.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("sync_job", job_id = "job-7");
            let _entered = span.enter();
            tracing::info!(
                api_key = "AIzaSecretValue",
                authorization = %"Bearer abc.def",
                item = "vid-1",
                attempts = 3u64,
                "Metadata client configured"
            );
        });

        capture.text()
    }

    #[test]
    fn test_text_formats_redact_credentials() {
        for format in [LogFormat::Pretty, LogFormat::Compact] {
            let output = capture_logs(format);
            assert!(!output.contains("AIzaSecretValue"), "{:?}: {}", format, output);
            assert!(!output.contains("Bearer abc"), "{:?}: {}", format, output);
            assert!(output.contains("api_key=[REDACTED]"), "{:?}: {}", format, output);
            assert!(output.contains("vid-1"));
            assert!(output.contains("Metadata client configured"));
        }
    }

    #[test]
    fn test_json_format_redacts_credentials() {
        let output = capture_logs(LogFormat::Json);
        assert!(!output.contains("AIzaSecretValue"));

        let event = output
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .find(|line| line["message"] == "Metadata client configured")
            .expect("event line");
        assert_eq!(event["api_key"], REDACTED);
        assert_eq!(event["authorization"], REDACTED);
        assert_eq!(event["item"], "vid-1");
        assert_eq!(event["attempts"], 3);
        assert_eq!(event["level"], "INFO");
        assert_eq!(event["spans"][0]["name"], "sync_job");
        assert!(event["spans"][0]["fields"]
            .as_str()
            .unwrap()
            .contains("job-7"));
    }

    #[test]
    fn test_default_filter_covers_workspace() {
        let filter = default_filter(LogLevel::Debug);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("core_sync=debug"));
        assert!(filter.contains("core_service=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_build_filter() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("debug"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("core_sync=trace,sqlx=info");
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("core_sync=trace"));
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_sync=notalevel");
        assert!(matches!(build_filter(&config), Err(Error::Logging(_))));
    }
}
