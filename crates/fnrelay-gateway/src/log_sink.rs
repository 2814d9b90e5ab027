//! Diagnostic log sink.
//!
//! Error events are emitted to a sink identified by a log group. The
//! buffered implementation decouples request latency from the log target:
//! events go onto an unbounded channel and a background task flushes them in
//! batches on a debounce interval, emitting through `tracing`.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Target for diagnostic events. Must be cheap and non-blocking; the
/// pipeline logs on the request path.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, event: Value);
}

/// Buffered sink with debounced flushes.
pub struct BufferedLogSink {
    tx: mpsc::UnboundedSender<(LogLevel, Value)>,
}

impl BufferedLogSink {
    /// Spawns the flush task and returns the sink handle.
    ///
    /// Buffered events are flushed every `debounce` interval, and a final
    /// flush runs when the sink is dropped and the channel drains.
    pub fn spawn(log_group: impl Into<String>, debounce: Duration) -> Self {
        let log_group = log_group.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<(LogLevel, Value)>();

        tokio::spawn(async move {
            let mut buffer: Vec<(LogLevel, Value)> = Vec::new();
            let mut ticker = tokio::time::interval(debounce);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => buffer.push(event),
                        None => {
                            flush(&log_group, &mut buffer);
                            break;
                        }
                    },
                    _ = ticker.tick() => flush(&log_group, &mut buffer),
                }
            }
        });

        BufferedLogSink { tx }
    }
}

impl LogSink for BufferedLogSink {
    fn log(&self, level: LogLevel, event: Value) {
        // Only fails when the flush task is gone, i.e. during shutdown.
        let _ = self.tx.send((level, event));
    }
}

fn flush(log_group: &str, buffer: &mut Vec<(LogLevel, Value)>) {
    for (level, event) in buffer.drain(..) {
        match level {
            LogLevel::Info => tracing::info!(log_group = %log_group, event = %event),
            LogLevel::Warn => tracing::warn!(log_group = %log_group, event = %event),
            LogLevel::Error => tracing::error!(log_group = %log_group, event = %event),
        }
    }
}

/// Sink that discards everything, for contexts where no log group is wired.
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _level: LogLevel, _event: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Sink that keeps everything, for assertions.
    pub struct CollectingLogSink {
        pub events: Arc<Mutex<Vec<(LogLevel, Value)>>>,
    }

    impl LogSink for CollectingLogSink {
        fn log(&self, level: LogLevel, event: Value) {
            self.events.lock().unwrap().push((level, event));
        }
    }

    #[tokio::test]
    async fn test_buffered_sink_accepts_events() {
        let sink = BufferedLogSink::spawn("test-group", Duration::from_millis(10));
        sink.log(LogLevel::Warn, json!({"message": "m"}));
        sink.log(LogLevel::Error, json!({"message": "n"}));
        // Give the flush task a tick; the assertion is that nothing panics
        // and the channel stays open.
        tokio::time::sleep(Duration::from_millis(30)).await;
        sink.log(LogLevel::Info, json!({"message": "o"}));
    }

    #[test]
    fn test_null_sink_discards() {
        NullLogSink.log(LogLevel::Error, json!({"message": "dropped"}));
    }

    #[tokio::test]
    async fn test_collecting_sink_records_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingLogSink { events: events.clone() };
        sink.log(LogLevel::Warn, json!(1));
        sink.log(LogLevel::Error, json!(2));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, LogLevel::Warn);
        assert_eq!(events[1].1, json!(2));
    }
}
