//! Logging utilities
//!
//! The renderer never writes to the process-wide logger implicitly. Every
//! component is handed a [`RenderLogger`] at construction time and emits
//! through it; [`RenderLogger::global`] is the usual choice and simply
//! forwards to whatever `log` backend the application installed.

use std::fmt;
use std::sync::Arc;

pub use log::Level;

/// Initialize `env_logger` as the process-wide `log` backend
pub fn init() {
    env_logger::init();
}

/// Forwards records to the logger installed through the `log` facade
struct GlobalSink;

impl log::Log for GlobalSink {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &log::Record<'_>) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Explicit logging collaborator passed into renderer components
#[derive(Clone)]
pub struct RenderLogger {
    sink: Arc<dyn log::Log>,
    target: &'static str,
}

impl RenderLogger {
    /// Log through a specific sink
    pub fn new(sink: Arc<dyn log::Log>, target: &'static str) -> Self {
        Self { sink, target }
    }

    /// Log through the `log` facade's installed logger
    pub fn global(target: &'static str) -> Self {
        Self::new(Arc::new(GlobalSink), target)
    }

    /// Same sink, different target
    pub fn with_target(&self, target: &'static str) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            target,
        }
    }

    /// Target attached to every record
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Emit one record at `level`
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = log::Metadata::builder()
            .level(level)
            .target(self.target)
            .build();
        if !self.sink.enabled(&metadata) {
            return;
        }

        self.sink.log(
            &log::Record::builder()
                .metadata(metadata)
                .args(args)
                .build(),
        );
    }

    /// Emit at error level
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    /// Emit at warn level
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    /// Emit at info level
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    /// Emit at debug level
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    /// Emit at trace level
    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl fmt::Debug for RenderLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLogger")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod capture {
    use std::sync::{Arc, Mutex};

    use super::{Level, RenderLogger};

    /// Sink that keeps every record in memory
    #[derive(Default)]
    pub struct CaptureSink {
        records: Mutex<Vec<(Level, String, String)>>,
    }

    impl CaptureSink {
        pub fn logger(self: &Arc<Self>, target: &'static str) -> RenderLogger {
            RenderLogger::new(Arc::clone(self) as Arc<dyn log::Log>, target)
        }

        pub fn messages(&self, level: Level) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _, _)| *l == level)
                .map(|(_, _, message)| message.clone())
                .collect()
        }

        pub fn targets(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .map(|(_, target, _)| target.clone())
                .collect()
        }
    }

    impl log::Log for CaptureSink {
        fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            self.records.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::capture::CaptureSink;
    use super::*;

    #[test]
    fn test_records_reach_the_injected_sink() {
        let sink = Arc::new(CaptureSink::default());
        let logger = sink.logger("forward");

        logger.error(format_args!("submit failed: {}", -4));
        logger.with_target("pool").debug(format_args!("allocated slot {}", 3));

        assert_eq!(sink.messages(Level::Error), vec!["submit failed: -4".to_string()]);
        assert_eq!(sink.messages(Level::Debug), vec!["allocated slot 3".to_string()]);
        assert_eq!(sink.targets(), vec!["forward".to_string(), "pool".to_string()]);
    }
}
