use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::channels::{LogNotifier, Notifier, WebhookNotifier};
use super::AlertChannel;
use crate::config::AlertsConfig;
use crate::monitoring::{MonitorEvent, StatusChange};

/// Longest a single transport may take to deliver one alert
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes monitor status changes to the enabled alert channels
#[derive(Default)]
pub struct AlertDispatcher {
    enabled: HashSet<AlertChannel>,
    notifiers: HashMap<AlertChannel, Vec<Box<dyn Notifier>>>,
}

/// Handle to a spawned dispatcher
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable channels per configuration.
    ///
    /// Toast alerts go to the log and a configured webhook gets every alert.
    /// Email and SMS transports must be registered by the embedding
    /// application with [`AlertDispatcher::register`].
    pub fn from_config(config: &AlertsConfig) -> Self {
        let mut dispatcher = Self::new();

        if config.use_toast {
            dispatcher.enable(AlertChannel::Toast);
            dispatcher.register(AlertChannel::Toast, Box::new(LogNotifier));
        }
        if config.use_email {
            dispatcher.enable(AlertChannel::Email);
        }
        if config.use_sms {
            dispatcher.enable(AlertChannel::Sms);
        }
        if let Some(url) = config.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
            dispatcher.enable(AlertChannel::Webhook);
            dispatcher.register(AlertChannel::Webhook, Box::new(WebhookNotifier::new(url)));
        }

        dispatcher
    }

    pub fn enable(&mut self, channel: AlertChannel) {
        self.enabled.insert(channel);
    }

    pub fn disable(&mut self, channel: AlertChannel) {
        self.enabled.remove(&channel);
    }

    pub fn is_enabled(&self, channel: AlertChannel) -> bool {
        self.enabled.contains(&channel)
    }

    /// Add a transport for `channel`
    pub fn register(&mut self, channel: AlertChannel, notifier: Box<dyn Notifier>) {
        self.notifiers.entry(channel).or_default().push(notifier);
    }

    /// Deliver one alert on one channel.
    ///
    /// Does nothing when the channel is disabled. Delivery failures are logged.
    pub async fn notify(&self, title: &str, body: &str, channel: AlertChannel) {
        if !self.is_enabled(channel) {
            return;
        }

        let Some(notifiers) = self.notifiers.get(&channel).filter(|list| !list.is_empty()) else {
            warn!(channel = %channel, "Alert channel enabled but no transport registered");
            return;
        };

        for notifier in notifiers {
            match timeout(DELIVERY_TIMEOUT, notifier.deliver(title, body)).await {
                Ok(Ok(())) => {
                    debug!(channel = %channel, notifier = notifier.name(), "Alert delivered")
                }
                Ok(Err(e)) => error!(
                    channel = %channel,
                    notifier = notifier.name(),
                    error = %e,
                    "Failed to deliver alert"
                ),
                Err(_) => error!(
                    channel = %channel,
                    notifier = notifier.name(),
                    timeout = ?DELIVERY_TIMEOUT,
                    "Alert delivery timed out"
                ),
            }
        }
    }

    pub async fn handle(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::StatusChanged(change) => {
                let (title, body) = format_alert(change);
                for channel in AlertChannel::ALL {
                    self.notify(&title, &body, channel).await;
                }
            }
            MonitorEvent::HealthChanged(health) => info!(health = %health, "Monitor health"),
            MonitorEvent::ResultRecorded { .. } => {}
        }
    }

    /// Consume events until the bus closes or the handle is stopped.
    ///
    /// On stop, events already queued on the bus are still delivered.
    pub fn spawn(self, mut events: broadcast::Receiver<MonitorEvent>) -> DispatcherHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => self.handle(&event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Alert dispatcher fell behind, events dropped");
                        }
                        Err(RecvError::Closed) => return,
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            loop {
                match events.try_recv() {
                    Ok(event) => self.handle(&event).await,
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Alert dispatcher fell behind, events dropped");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
            debug!("Alert dispatcher stopped");
        });

        DispatcherHandle { shutdown, task }
    }
}

impl DispatcherHandle {
    /// Deliver what is queued, giving up after `grace`
    pub async fn stop(self, grace: Duration) {
        let _ = self.shutdown.send(true);
        let abort = self.task.abort_handle();
        match timeout(grace, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Alert dispatcher task failed: {}", e),
            Err(_) => {
                warn!(grace = ?grace, "Pending alerts not delivered before shutdown");
                abort.abort();
            }
        }
    }
}

/// Title and body of the alert for a status change
pub fn format_alert(change: &StatusChange) -> (String, String) {
    let title = if change.passed {
        format!("{} is back UP", change.monitor)
    } else {
        format!("{} is DOWN", change.monitor)
    };

    let mut body = format!(
        "{}\nChecked at {}",
        change.url,
        change.result.end_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(reason) = &change.result.reason {
        body.push_str(&format!("\nReason: {reason}"));
    }
    if let Some(kind) = &change.result.exception_type {
        body.push_str(&format!("\nError: {kind}"));
    }

    (title, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::NotifyError;
    use crate::monitoring::CheckResult;
    use crate::monitoring::types::exception;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn deliver(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(subject.to_string());
            if self.fail { Err(NotifyError::Delivery("offline".into())) } else { Ok(()) }
        }
    }

    fn change(passed: bool) -> StatusChange {
        let result = if passed {
            CheckResult::started(Utc::now()).success()
        } else {
            CheckResult::started(Utc::now()).error(exception::TIMEOUT, "Request timed out")
        };
        StatusChange { monitor: "Google".into(), url: "http://www.google.com".into(), passed, result }
    }

    #[test]
    fn test_alert_text() {
        let (title, body) = format_alert(&change(false));
        assert_eq!(title, "Google is DOWN");
        assert!(body.contains("http://www.google.com"));
        assert!(body.contains("Reason: Request timed out"));
        assert!(body.contains("Error: Timeout"));

        let (title, _) = format_alert(&change(true));
        assert_eq!(title, "Google is back UP");
    }

    #[tokio::test]
    async fn test_only_enabled_channels_are_notified() {
        let toast = Recorder::default();
        let email = Recorder::default();
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.register(AlertChannel::Toast, Box::new(toast.clone()));
        dispatcher.register(AlertChannel::Email, Box::new(email.clone()));
        dispatcher.enable(AlertChannel::Toast);

        dispatcher.handle(&MonitorEvent::StatusChanged(change(false))).await;

        assert_eq!(*toast.sent.lock().unwrap(), vec!["Google is DOWN".to_string()]);
        assert!(email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_others() {
        let broken = Recorder { fail: true, ..Recorder::default() };
        let working = Recorder::default();
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.register(AlertChannel::Toast, Box::new(broken.clone()));
        dispatcher.register(AlertChannel::Toast, Box::new(working.clone()));
        dispatcher.enable(AlertChannel::Toast);

        dispatcher.notify("title", "body", AlertChannel::Toast).await;

        assert_eq!(broken.sent.lock().unwrap().len(), 1);
        assert_eq!(working.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = AlertsConfig {
            use_toast: true,
            use_email: true,
            use_sms: false,
            webhook_url: Some("  ".into()),
        };
        let dispatcher = AlertDispatcher::from_config(&config);

        assert!(dispatcher.is_enabled(AlertChannel::Toast));
        assert!(dispatcher.is_enabled(AlertChannel::Email));
        assert!(!dispatcher.is_enabled(AlertChannel::Sms));
        assert!(!dispatcher.is_enabled(AlertChannel::Webhook));
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_follows_the_bus() {
        let recorder = Recorder::default();
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.register(AlertChannel::Toast, Box::new(recorder.clone()));
        dispatcher.enable(AlertChannel::Toast);

        let (tx, rx) = broadcast::channel(8);
        let handle = dispatcher.spawn(rx);
        tx.send(MonitorEvent::StatusChanged(change(false))).unwrap();
        tx.send(MonitorEvent::StatusChanged(change(true))).unwrap();
        handle.stop(Duration::from_secs(5)).await;

        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec!["Google is DOWN".to_string(), "Google is back UP".to_string()]
        );
        drop(tx);
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn deliver(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_transport_does_not_block_alerts() {
        let recorder = Recorder::default();
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.register(AlertChannel::Toast, Box::new(Stalled));
        dispatcher.register(AlertChannel::Toast, Box::new(recorder.clone()));
        dispatcher.enable(AlertChannel::Toast);

        let (tx, rx) = broadcast::channel(8);
        let handle = dispatcher.spawn(rx);
        tx.send(MonitorEvent::StatusChanged(change(false))).unwrap();
        tx.send(MonitorEvent::StatusChanged(change(true))).unwrap();
        handle.stop(DELIVERY_TIMEOUT * 4).await;

        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec!["Google is DOWN".to_string(), "Google is back UP".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_gives_up_after_grace() {
        let mut dispatcher = AlertDispatcher::new();
        dispatcher.register(AlertChannel::Toast, Box::new(Stalled));
        dispatcher.enable(AlertChannel::Toast);

        let (tx, rx) = broadcast::channel(8);
        let handle = dispatcher.spawn(rx);
        tx.send(MonitorEvent::StatusChanged(change(false))).unwrap();

        let started = tokio::time::Instant::now();
        handle.stop(Duration::from_secs(1)).await;
        assert!(started.elapsed() < DELIVERY_TIMEOUT);
    }
}
