//! Cycle orchestrator.
//!
//! One cycle walks the watchlist: fetch bars, build the chart, compare its
//! signature with the stored one, alert on a change, and record the new
//! signature. Instruments are processed in parallel on a dedicated rayon
//! pool. A failure for one instrument is logged and reported but never
//! stops the others, and leaves that instrument's signature untouched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;

use pnf_core::domain::drop_void;
use pnf_core::{
    build_chart, detect_change, BarSource, ChangeEvent, Chart, ChartConfig, ChartError,
    ConfigError, DataError, Instrument, Interval, Signature, Watchlist,
};

use crate::alerts::AlertLog;
use crate::config::MonitorConfig;
use crate::notify::{format_alert, Notifier};
use crate::schedule::{ScheduleConfig, Scheduler};
use crate::store::{SignatureStore, StoreError};

/// Why one instrument produced no signature this cycle.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("data unavailable: {0}")]
    Data(#[from] DataError),

    #[error("chart build failed: {0}")]
    Chart(#[from] ChartError),

    #[error("chart has no columns")]
    EmptyChart,
}

/// What happened to one instrument in a cycle.
#[derive(Debug)]
pub enum InstrumentOutcome {
    /// No earlier signature; recorded silently.
    FirstObservation(Signature),
    Unchanged(Signature),
    Changed {
        event: ChangeEvent,
        /// Whether the notifier accepted the alert.
        delivered: bool,
    },
    /// Another recomputation of this instrument was still running.
    SkippedInFlight,
    Failed(InstrumentError),
}

#[derive(Debug)]
pub struct InstrumentReport {
    pub symbol: String,
    pub outcome: InstrumentOutcome,
}

/// Result of one pass over the watchlist, in watchlist order.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// How long the source was still refusing requests when the cycle began.
    pub source_cooldown: Duration,
    pub instruments: Vec<InstrumentReport>,
}

impl CycleReport {
    fn count(&self, pred: impl Fn(&InstrumentOutcome) -> bool) -> usize {
        self.instruments.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn changed(&self) -> usize {
        self.count(|o| matches!(o, InstrumentOutcome::Changed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, InstrumentOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, InstrumentOutcome::SkippedInFlight))
    }

    /// Instruments with a recorded signature this cycle.
    pub fn succeeded(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                InstrumentOutcome::FirstObservation(_)
                    | InstrumentOutcome::Unchanged(_)
                    | InstrumentOutcome::Changed { .. }
            )
        })
    }

    pub fn events(&self) -> Vec<&ChangeEvent> {
        self.instruments
            .iter()
            .filter_map(|r| match &r.outcome {
                InstrumentOutcome::Changed { event, .. } => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, symbol: &str) -> Option<&InstrumentOutcome> {
        self.instruments
            .iter()
            .find(|r| r.symbol == symbol)
            .map(|r| &r.outcome)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle: {} instruments, {} ok, {} changed, {} failed, {} skipped in {:.2}s",
            self.instruments.len(),
            self.succeeded(),
            self.changed(),
            self.failed(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        )?;
        if !self.source_cooldown.is_zero() {
            write!(f, " (source refusing for {}s)", self.source_cooldown.as_secs())?;
        }
        Ok(())
    }
}

pub struct Orchestrator {
    source: Arc<dyn BarSource>,
    notifier: Arc<dyn Notifier>,
    watchlist: Watchlist,
    chart: ChartConfig,
    interval: Interval,
    store: Arc<SignatureStore>,
    alerts: Arc<AlertLog>,
    signature_file: Option<PathBuf>,
    pool: Option<rayon::ThreadPool>,
}

impl Orchestrator {
    /// Build from a monitor config. The config is validated here, once.
    ///
    /// Signatures are loaded from `runtime.signature_file` when it is set and
    /// exists; a corrupt file is logged and ignored.
    pub fn new(
        config: &MonitorConfig,
        source: Arc<dyn BarSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = match &config.runtime.signature_file {
            Some(path) => match SignatureStore::load(path) {
                Ok(store) => {
                    log::info!("loaded {} signatures from {}", store.len(), path.display());
                    store
                }
                Err(e) => {
                    log::warn!("ignoring signature file {}: {e}", path.display());
                    SignatureStore::new()
                }
            },
            None => SignatureStore::new(),
        };

        let pool = if config.runtime.threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.runtime.threads)
                    .thread_name(|i| format!("pnf-worker-{i}"))
                    .build()
                    .map_err(|e| ConfigError::InvalidRuntime(format!("thread pool: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            source,
            notifier,
            watchlist: config.watchlist.clone(),
            chart: config.chart.chart_config(),
            interval: config.chart.interval,
            store: Arc::new(store),
            alerts: Arc::new(AlertLog::new(config.runtime.alert_log_capacity)),
            signature_file: config.runtime.signature_file.clone(),
            pool,
        })
    }

    /// Share a signature store with other orchestrators.
    pub fn with_store(mut self, store: Arc<SignatureStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<SignatureStore> {
        &self.store
    }

    pub fn alerts(&self) -> &Arc<AlertLog> {
        &self.alerts
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    /// Run one pass over the watchlist.
    pub fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let source_cooldown = self.source.unavailable_for();
        if !self.source.is_available() {
            log::warn!(
                "{} source is refusing requests for another {}s, fetches will fail this cycle",
                self.source.name(),
                source_cooldown.as_secs()
            );
        }

        let instruments: Vec<InstrumentReport> = match &self.pool {
            Some(pool) => pool.install(|| {
                self.watchlist
                    .instruments
                    .par_iter()
                    .map(|inst| self.report(inst))
                    .collect()
            }),
            None => self.watchlist.iter().map(|inst| self.report(inst)).collect(),
        };

        let report = CycleReport {
            started_at,
            elapsed: start.elapsed(),
            source_cooldown,
            instruments,
        };
        log::info!("{report}");

        if let Some(path) = &self.signature_file {
            if let Err(e) = self.save_signatures(path) {
                log::warn!("failed to save signatures to {}: {e}", path.display());
            }
        }
        report
    }

    /// Run cycles on the schedule until `cancel` is set. Returns the number
    /// of cycles run.
    pub fn watch(
        &self,
        schedule: &ScheduleConfig,
        cancel: &AtomicBool,
    ) -> Result<usize, ConfigError> {
        let hours = schedule.market_hours()?;
        let runs = Scheduler::new(schedule.period()).run(
            |now| hours.is_open(now),
            cancel,
            || {
                self.run_cycle();
            },
        );
        Ok(runs)
    }

    pub fn save_signatures(&self, path: &Path) -> Result<(), StoreError> {
        self.store.save(path)
    }

    fn report(&self, instrument: &Instrument) -> InstrumentReport {
        InstrumentReport {
            symbol: instrument.symbol.clone(),
            outcome: self.process(instrument),
        }
    }

    fn process(&self, instrument: &Instrument) -> InstrumentOutcome {
        let symbol = instrument.symbol.as_str();
        let Some(guard) = self.store.begin(symbol) else {
            log::debug!("{symbol}: previous recomputation still in flight, skipping");
            return InstrumentOutcome::SkippedInFlight;
        };

        let chart = match self.fetch_chart(instrument) {
            Ok(chart) => chart,
            Err(e) => {
                log::warn!("{symbol}: {e}");
                return InstrumentOutcome::Failed(e);
            }
        };

        let detection = detect_change(guard.previous(), &chart);
        let first = guard.previous().is_none();
        let Some(signature) = detection.signature else {
            log::warn!("{symbol}: chart has no columns");
            return InstrumentOutcome::Failed(InstrumentError::EmptyChart);
        };
        guard.commit(signature);

        if !detection.changed {
            return if first {
                log::debug!("{symbol}: first observation {signature:?}");
                InstrumentOutcome::FirstObservation(signature)
            } else {
                InstrumentOutcome::Unchanged(signature)
            };
        }

        let Some(event) = ChangeEvent::from_chart(symbol, &chart) else {
            return InstrumentOutcome::Unchanged(signature);
        };
        self.alerts.record(&event);
        let message = format_alert(&event, self.interval);
        let delivered = match self.notifier.notify(&event, &message) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{symbol}: {} alert not delivered: {e}", self.notifier.name());
                false
            }
        };
        log::info!(
            "{symbol}: new {} column ({} columns, box {:.2})",
            event.kind,
            event.column_count,
            event.box_size
        );
        InstrumentOutcome::Changed { event, delivered }
    }

    fn fetch_chart(&self, instrument: &Instrument) -> Result<Chart, InstrumentError> {
        let bars = drop_void(self.source.fetch(instrument, self.interval)?);
        let need = self.chart.min_bars();
        if bars.len() < need {
            return Err(DataError::InsufficientHistory {
                symbol: instrument.symbol.clone(),
                got: bars.len(),
                need,
            }
            .into());
        }
        Ok(build_chart(&bars, &self.chart)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use chrono::TimeZone;
    use pnf_core::{Bar, ColumnKind};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves whatever closes are currently set per symbol.
    #[derive(Default)]
    struct ScriptedSource {
        closes: Mutex<HashMap<String, Vec<f64>>>,
        refusing_for: Mutex<Duration>,
    }

    impl ScriptedSource {
        fn set(&self, symbol: &str, closes: &[f64]) {
            self.closes
                .lock()
                .unwrap()
                .insert(symbol.to_string(), closes.to_vec());
        }
    }

    impl BarSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&self, instrument: &Instrument, _: Interval) -> Result<Vec<Bar>, DataError> {
            let closes = self
                .closes
                .lock()
                .unwrap()
                .get(&instrument.symbol)
                .cloned()
                .ok_or_else(|| DataError::NetworkUnreachable("scripted outage".into()))?;
            let base = Utc.with_ymd_and_hms(2024, 1, 3, 3, 45, 0).unwrap();
            Ok(closes
                .iter()
                .enumerate()
                .map(|(i, &close)| Bar {
                    timestamp: base + chrono::Duration::minutes(30 * i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1,
                })
                .collect())
        }

        fn is_available(&self) -> bool {
            self.unavailable_for().is_zero()
        }

        fn unavailable_for(&self) -> Duration {
            *self.refusing_for.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        fn notify(&self, event: &ChangeEvent, message: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((event.symbol.clone(), message.to_string()));
            if self.fail {
                Err(NotifyError::Http("down".into()))
            } else {
                Ok(())
            }
        }
    }

    const RISE: [f64; 7] = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
    const RISE_AND_FALL: [f64; 13] = [
        10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 15.0, 14.0, 13.0, 12.0, 11.0, 10.0,
    ];

    fn config(symbols: &[&str], threads: usize) -> MonitorConfig {
        let mut cfg = MonitorConfig::default();
        cfg.chart.lookback = 2;
        cfg.runtime.threads = threads;
        cfg.watchlist = Watchlist::new(
            symbols
                .iter()
                .enumerate()
                .map(|(i, s)| Instrument::new(*s, i as u64 + 1, "NSE"))
                .collect(),
        );
        cfg
    }

    fn setup(
        symbols: &[&str],
        threads: usize,
        fail_notify: bool,
    ) -> (Orchestrator, Arc<ScriptedSource>, Arc<RecordingNotifier>) {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(RecordingNotifier {
            fail: fail_notify,
            ..Default::default()
        });
        let orch = Orchestrator::new(&config(symbols, threads), source.clone(), notifier.clone())
            .unwrap();
        (orch, source, notifier)
    }

    #[test]
    fn first_cycle_is_silent_then_change_alerts() {
        let (orch, source, notifier) = setup(&["INFY"], 1, false);
        source.set("INFY", &RISE);

        let report = orch.run_cycle();
        assert!(matches!(
            report.outcome("INFY"),
            Some(InstrumentOutcome::FirstObservation(_))
        ));
        assert!(notifier.sent.lock().unwrap().is_empty());

        let report = orch.run_cycle();
        assert!(matches!(report.outcome("INFY"), Some(InstrumentOutcome::Unchanged(_))));

        source.set("INFY", &RISE_AND_FALL);
        let report = orch.run_cycle();
        assert_eq!(report.changed(), 1);
        let event = report.events()[0];
        assert_eq!(event.kind, ColumnKind::O);
        assert_eq!(event.column_count, 2);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("New Column Detected: *O*"));
        assert_eq!(orch.alerts().len(), 1);
        assert_eq!(
            orch.store().get("INFY"),
            Some(Signature {
                column_count: 2,
                kind: ColumnKind::O
            })
        );
    }

    #[test]
    fn failure_is_isolated_and_keeps_signature() {
        let (orch, source, _) = setup(&["INFY", "TCS", "ITC"], 2, false);
        source.set("INFY", &RISE);
        source.set("TCS", &RISE);
        source.set("ITC", &RISE);
        orch.run_cycle();
        let before = orch.store().get("TCS");

        // TCS goes dark; the others keep going.
        source.closes.lock().unwrap().remove("TCS");
        source.set("INFY", &RISE_AND_FALL);
        let report = orch.run_cycle();
        assert_eq!(report.instruments.len(), 3);
        assert_eq!(report.instruments[1].symbol, "TCS");
        assert!(matches!(
            report.outcome("TCS"),
            Some(InstrumentOutcome::Failed(InstrumentError::Data(_)))
        ));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.changed(), 1);
        assert_eq!(orch.store().get("TCS"), before);
    }

    #[test]
    fn short_history_is_data_unavailable() {
        let (orch, source, _) = setup(&["ITC"], 1, false);
        source.set("ITC", &[10.0, 11.0]);
        let report = orch.run_cycle();
        assert!(matches!(
            report.outcome("ITC"),
            Some(InstrumentOutcome::Failed(InstrumentError::Data(
                DataError::InsufficientHistory { got: 2, need: 3, .. }
            )))
        ));
        assert!(orch.store().get("ITC").is_none());
    }

    #[test]
    fn notification_failure_still_updates_signature() {
        let (orch, source, notifier) = setup(&["INFY"], 1, true);
        source.set("INFY", &RISE);
        orch.run_cycle();
        source.set("INFY", &RISE_AND_FALL);
        let report = orch.run_cycle();
        assert!(matches!(
            report.outcome("INFY"),
            Some(InstrumentOutcome::Changed { delivered: false, .. })
        ));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(orch.store().get("INFY").unwrap().kind, ColumnKind::O);

        // Same chart next cycle: no repeat alert.
        let report = orch.run_cycle();
        assert_eq!(report.changed(), 0);
    }

    #[test]
    fn in_flight_instrument_is_skipped() {
        let (orch, source, _) = setup(&["INFY", "TCS"], 1, false);
        source.set("INFY", &RISE);
        source.set("TCS", &RISE);
        let claim = orch.store().begin("INFY").unwrap();
        let report = orch.run_cycle();
        assert!(matches!(report.outcome("INFY"), Some(InstrumentOutcome::SkippedInFlight)));
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.succeeded(), 1);
        drop(claim);
        assert!(orch.store().get("INFY").is_none());
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut cfg = config(&["INFY"], 1);
        cfg.chart.reversal = 0;
        let result = Orchestrator::new(
            &cfg,
            Arc::new(ScriptedSource::default()),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(matches!(result, Err(ConfigError::InvalidReversal(0))));
    }

    #[test]
    fn signatures_persist_between_orchestrators() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&["INFY"], 1);
        cfg.runtime.signature_file = Some(dir.path().join("sigs.json"));

        let source = Arc::new(ScriptedSource::default());
        source.set("INFY", &RISE);
        let notifier = Arc::new(RecordingNotifier::default());
        let first = Orchestrator::new(&cfg, source.clone(), notifier.clone()).unwrap();
        first.run_cycle();

        // A restarted process remembers the X column and alerts on the reversal.
        source.set("INFY", &RISE_AND_FALL);
        let second = Orchestrator::new(&cfg, source, notifier.clone()).unwrap();
        assert_eq!(second.store().len(), 1);
        let report = second.run_cycle();
        assert_eq!(report.changed(), 1);
    }

    #[test]
    fn report_summary_line() {
        let (orch, source, _) = setup(&["INFY", "TCS"], 1, false);
        source.set("INFY", &RISE);
        let line = orch.run_cycle().to_string();
        assert!(
            line.starts_with("cycle: 2 instruments, 1 ok, 0 changed, 1 failed, 0 skipped"),
            "{line}"
        );
        assert!(!line.contains("refusing"), "{line}");
    }

    #[test]
    fn report_carries_source_cooldown() {
        let (orch, source, _) = setup(&["INFY"], 1, false);
        source.set("INFY", &RISE);
        *source.refusing_for.lock().unwrap() = Duration::from_secs(120);

        let report = orch.run_cycle();
        assert_eq!(report.source_cooldown, Duration::from_secs(120));
        assert!(
            report.to_string().ends_with("(source refusing for 120s)"),
            "{report}"
        );
    }
}
