//! Outbound alert channel.
//!
//! The monitoring loop only ever calls [`NotificationSink::send`]; delivery is
//! fire-and-forget, so implementations must not block the caller on network
//! round-trips and must swallow (and log) their own delivery failures.

use std::sync::Arc;

/// Destination for human-readable alerts.
pub trait NotificationSink: Send + Sync {
    /// Dispatch `text` to the pre-bound destination.
    fn send(&self, text: &str);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn send(&self, text: &str) {
        (**self).send(text)
    }
}

/// Sink that writes alerts to the tracing log only.
///
/// Used by headless runs that have no chat front end.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn send(&self, text: &str) {
        tracing::info!(target: "follow_monitor::alert", "{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl NotificationSink for Recording {
        fn send(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[test]
    fn test_arc_sink_forwards_to_inner() {
        let inner = Arc::new(Recording::default());
        let sink: Arc<dyn NotificationSink> = inner.clone();
        sink.send("hello");
        sink.send("world");
        assert_eq!(*inner.0.lock().unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn test_log_notifier_does_not_panic() {
        LogNotifier.send("@someone started following @alice");
    }
}
