//! Process-wide leveled logger for the node.
//!
//! Records go to stderr as text or one JSON object per line. Debug output
//! for noisy subsystems is gated behind [`Category`] switches, and a bounded
//! in-memory ring can retain recent records for tests and status dumps.

mod capture;
mod category;
mod clock;

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde_json::json;

pub use capture::{capture_snapshot, clear_captured_logs, disable_capture, enable_capture, CapturedLog};
pub use category::{category_enabled, enable_category, reset_categories, Category};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let level = match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return None,
        };
        Some(level)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Text = 0,
    Json = 1,
}

impl Format {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn load() -> Self {
        if LOG_FORMAT.load(Ordering::Relaxed) == Self::Json as u8 {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: Level,
    pub format: Format,
    pub timestamps: bool,
    pub categories: Vec<Category>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: Format::Text,
            timestamps: true,
            categories: Vec::new(),
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static LOG_FORMAT: AtomicU8 = AtomicU8::new(Format::Text as u8);
static LOG_TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static LOG_STDERR_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn init(config: &LogConfig) {
    LOG_LEVEL.store(config.level as u8, Ordering::Relaxed);
    LOG_FORMAT.store(config.format as u8, Ordering::Relaxed);
    LOG_TIMESTAMPS.store(config.timestamps, Ordering::Relaxed);
    reset_categories();
    for category in &config.categories {
        enable_category(*category);
    }
}

pub fn set_stderr_enabled(enabled: bool) {
    LOG_STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= LOG_LEVEL.load(Ordering::Relaxed)
}

pub fn log(
    level: Level,
    category: Option<Category>,
    target: &'static str,
    file: &'static str,
    line: u32,
    args: fmt::Arguments<'_>,
) {
    let capturing = capture::is_enabled();
    let format = Format::load();
    let now = clock::now();
    let msg = if matches!(format, Format::Json) || capturing {
        Some(args.to_string())
    } else {
        None
    };

    if LOG_STDERR_ENABLED.load(Ordering::Relaxed) {
        let mut out = io::stderr().lock();
        match format {
            Format::Text => {
                if LOG_TIMESTAMPS.load(Ordering::Relaxed) {
                    let _ = write!(out, "{} ", now);
                }
                match category {
                    Some(category) => {
                        let _ = write!(out, "{} {} [{}]: ", level.as_str(), target, category.as_str());
                    }
                    None => {
                        let _ = write!(out, "{} {}: ", level.as_str(), target);
                    }
                }
                let _ = writeln!(out, "{args}");
            }
            Format::Json => {
                let record = json!({
                    "ts_ms": now.millis_since_epoch(),
                    "level": level.as_str(),
                    "target": target,
                    "category": category.map(Category::as_str),
                    "file": file,
                    "line": line,
                    "msg": msg.as_deref().unwrap_or_default(),
                });
                let _ = writeln!(out, "{record}");
            }
        }
    }

    if capturing {
        capture::push(CapturedLog {
            ts_ms: now.millis_since_epoch(),
            level,
            category,
            target,
            file,
            line,
            msg: msg.unwrap_or_default(),
        });
    }
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::enabled($level) {
            $crate::log($level, None, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

/// Debug-level record gated on a subsystem switch (`-debug=<category>`).
#[macro_export]
macro_rules! log_category {
    ($category:expr, $($arg:tt)*) => {{
        // An enabled category is emitted regardless of the global level.
        let category: $crate::Category = $category;
        if $crate::category_enabled(category) {
            $crate::log(
                $crate::Level::Debug,
                Some(category),
                module_path!(),
                file!(),
                line!(),
                format_args!($($arg)*),
            );
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Error, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Warn, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Info, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Debug, $($arg)*);
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        $crate::log_at!($crate::Level::Trace, $($arg)*);
    }};
}
