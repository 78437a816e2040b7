//! Alert delivery.
//!
//! Delivery is best-effort: the orchestrator logs a failed notification and
//! carries on. Nothing here retries.

use std::time::Duration;

use pnf_core::{ChangeEvent, Interval};
use thiserror::Error;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("delivery rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("all notifiers failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

/// A sink for change alerts.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, event: &ChangeEvent, message: &str) -> Result<(), NotifyError>;
}

/// Markdown alert text for a change event.
pub fn format_alert(event: &ChangeEvent, interval: Interval) -> String {
    format!(
        "🚨 *P&F Alert: {}*\nNew Column Detected: *{}*\nInterval: {} | ATR Box Size: {:.2}\nTime: {}",
        event.symbol,
        event.kind,
        interval.label(),
        event.box_size,
        event.timestamp.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Telegram Bot API `sendMessage` delivery.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(
        bot_token: Option<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            bot_token: bot_token.filter(|t| !t.trim().is_empty()),
            chat_id: chat_id.filter(|c| !c.trim().is_empty()),
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    fn send_url(&self, token: &str) -> String {
        format!("{}/bot{token}/sendMessage", self.api_base.trim_end_matches('/'))
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn notify(&self, event: &ChangeEvent, message: &str) -> Result<(), NotifyError> {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            log::warn!("telegram config missing, alert for {} suppressed", event.symbol);
            return Err(NotifyError::NotConfigured(
                "telegram bot token and chat id are required".into(),
            ));
        };

        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        let resp = self
            .client
            .post(self.send_url(token))
            .json(&body)
            .send()
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Writes alerts to the log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, event: &ChangeEvent, message: &str) -> Result<(), NotifyError> {
        log::info!(
            "alert {}: new {} column ({} columns)\n{message}",
            event.symbol,
            event.kind,
            event.column_count
        );
        Ok(())
    }
}

/// Delivers to every inner notifier; fails only if all of them fail.
#[derive(Default)]
pub struct FanoutNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    fn notify(&self, event: &ChangeEvent, message: &str) -> Result<(), NotifyError> {
        if self.notifiers.is_empty() {
            return Ok(());
        }
        let mut failures = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event, message) {
                log::warn!("{} notifier failed for {}: {e}", notifier.name(), event.symbol);
                failures.push(format!("{}: {e}", notifier.name()));
            }
        }
        if failures.len() == self.notifiers.len() {
            Err(NotifyError::AllFailed(failures))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pnf_core::ColumnKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event() -> ChangeEvent {
        ChangeEvent {
            symbol: "RELIANCE".into(),
            kind: ColumnKind::X,
            column_count: 7,
            box_size: 12.3456,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 3, 6, 15, 0).unwrap(),
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Notifier for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn notify(&self, _: &ChangeEvent, _: &str) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Http("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn alert_text_matches_format() {
        let text = format_alert(&event(), Interval::ThirtyMinute);
        assert_eq!(
            text,
            "🚨 *P&F Alert: RELIANCE*\nNew Column Detected: *X*\n\
             Interval: 30m | ATR Box Size: 12.35\nTime: 2024-01-03 06:15 UTC"
        );
    }

    #[test]
    fn unconfigured_telegram_is_suppressed() {
        let n = TelegramNotifier::new(
            Some("token".into()),
            Some("  ".into()),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!n.is_configured());
        assert!(matches!(
            n.notify(&event(), "hi"),
            Err(NotifyError::NotConfigured(_))
        ));
    }

    #[test]
    fn telegram_url_includes_token() {
        let n = TelegramNotifier::new(
            Some("123:abc".into()),
            Some("42".into()),
            Duration::from_secs(1),
        )
        .unwrap()
        .with_api_base("http://localhost:1/");
        assert!(n.is_configured());
        assert_eq!(n.send_url("123:abc"), "http://localhost:1/bot123:abc/sendMessage");
    }

    #[test]
    fn fanout_succeeds_if_any_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fanout = FanoutNotifier::new()
            .with(Counting {
                calls: calls.clone(),
                fail: true,
            })
            .with(Counting {
                calls: calls.clone(),
                fail: false,
            });
        assert!(fanout.notify(&event(), "msg").is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fanout_fails_if_all_fail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fanout = FanoutNotifier::new().with(Counting {
            calls: calls.clone(),
            fail: true,
        });
        let err = fanout.notify(&event(), "msg").unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(FanoutNotifier::new().notify(&event(), "msg").is_ok());
    }

    #[test]
    fn log_notifier_never_fails() {
        assert!(LogNotifier.notify(&event(), "msg").is_ok());
    }
}
