//! Polling scheduler.
//!
//! An explicit two-state machine:
//!
//! ```text
//!            cycle finished (always)
//!   ┌────────┐ ─────────────────────▶ ┌────────┐
//!   │ Active │                        │  Idle  │
//!   └────────┘ ◀───────────────────── └────────┘
//!            random delay elapsed
//! ```
//!
//! An active cycle evaluates the calendar gate once. When eligible it walks
//! the registry in order: expiry check, screener fetch, then one notification
//! per ranked symbol. No client's outcome affects another's, and no cycle's
//! outcome stops the loop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use scanwatch_common::config::{ClientConfig, ScheduleConfig, MAX_DELAY_SECS};

use crate::calendar::{CalendarGate, GateDecision};
use crate::clock::Clock;
use crate::notification::{Notifier, NotifyOutcome};
use crate::registry::{self, ClientRegistry};
use crate::screener::Screener;

// ============================================================================
// State
// ============================================================================

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting out the inter-cycle delay
    Idle,
    /// Running one cycle
    Active,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

// ============================================================================
// Delay
// ============================================================================

/// Uniform range for the inter-cycle delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    min_secs: f64,
    max_secs: f64,
}

impl DelayRange {
    /// Bounds are clamped to `[0, MAX_DELAY_SECS]` and ordered.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let clamp = |secs: f64| secs.clamp(0.0, MAX_DELAY_SECS);
        let min_secs = if min_secs.is_finite() { clamp(min_secs) } else { 0.0 };
        let max_secs = if max_secs.is_finite() { clamp(max_secs).max(min_secs) } else { min_secs };
        Self { min_secs, max_secs }
    }

    pub fn from_config(schedule: &ScheduleConfig) -> Self {
        Self::new(schedule.delay_min_secs, schedule.delay_max_secs)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = if self.max_secs > self.min_secs {
            rng.gen_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        };
        Duration::from_secs_f64(secs)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::new(55.0, 65.0)
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub decision: GateDecision,
    /// Clients whose screener was queried
    pub clients_processed: usize,
    pub clients_expired: usize,
    /// Processed clients with no usable symbols
    pub clients_without_results: usize,
    pub delivered: usize,
    pub delivery_failures: usize,
}

impl CycleReport {
    fn empty(decision: GateDecision) -> Self {
        Self {
            decision,
            clients_processed: 0,
            clients_expired: 0,
            clients_without_results: 0,
            delivered: 0,
            delivery_failures: 0,
        }
    }

    /// Whether the gate allowed client work.
    pub fn ran(&self) -> bool {
        self.decision.is_eligible()
    }
}

/// Everything one cycle reads. Shared read-only across cycles.
struct CycleContext {
    gate: CalendarGate,
    registry: ClientRegistry,
    screener: Arc<dyn Screener>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl CycleContext {
    async fn run(&self) -> CycleReport {
        let now = self.clock.now();
        let decision = self.gate.evaluate(&now);

        if !decision.is_eligible() {
            info!(now = %now, reason = %decision, "Skipping cycle");
            return CycleReport::empty(decision);
        }

        debug!(now = %now, reason = %decision, clients = self.registry.len(), "Starting cycle");

        let today = self.gate.today(&now);
        let mut report = CycleReport::empty(decision);

        for client in &self.registry {
            if registry::is_expired(client, today) {
                warn!(client = %client.name, expiry = %client.expiry, "Client subscription expired");
                report.clients_expired += 1;
                continue;
            }
            self.process_client(client, &mut report).await;
        }

        report
    }

    async fn process_client(&self, client: &ClientConfig, report: &mut CycleReport) {
        report.clients_processed += 1;

        let result = self
            .screener
            .fetch_ranked_symbols(&registry::query_for(client))
            .await
            .into_result();

        if result.is_empty() {
            info!(client = %client.name, "No valid stock data found for client");
            report.clients_without_results += 1;
            return;
        }

        let destination = registry::destination_for(client);
        for symbol in result.symbols() {
            match self.notifier.notify(&destination, symbol).await {
                NotifyOutcome::Delivered => report.delivered += 1,
                NotifyOutcome::Failed(_) => report.delivery_failures += 1,
            }
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Drives cycles forever with randomized pauses between them.
pub struct Scheduler {
    context: Arc<CycleContext>,
    clock: Arc<dyn Clock>,
    delay: DelayRange,
    rng: StdRng,
    cycles_run: u64,
}

impl Scheduler {
    pub fn new(
        gate: CalendarGate,
        registry: ClientRegistry,
        screener: Arc<dyn Screener>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        delay: DelayRange,
    ) -> Self {
        let context = Arc::new(CycleContext {
            gate,
            registry,
            screener,
            notifier,
            clock: Arc::clone(&clock),
        });

        Self {
            context,
            clock,
            delay,
            rng: StdRng::from_entropy(),
            cycles_run: 0,
        }
    }

    /// Replace the delay randomness source.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Number of completed cycles.
    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Run one cycle inline.
    pub async fn run_cycle(&self) -> CycleReport {
        self.context.run().await
    }

    /// Advance the state machine by one transition.
    pub async fn step(&mut self, state: SchedulerState) -> SchedulerState {
        match state {
            SchedulerState::Active => {
                let context = Arc::clone(&self.context);
                // A panicking cycle must not take the loop down with it.
                match tokio::spawn(async move { context.run().await }).await {
                    Ok(report) => {
                        if report.ran() {
                            info!(
                                processed = report.clients_processed,
                                expired = report.clients_expired,
                                without_results = report.clients_without_results,
                                delivered = report.delivered,
                                failed = report.delivery_failures,
                                "Cycle complete"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Cycle aborted"),
                }
                self.cycles_run += 1;
                SchedulerState::Idle
            }
            SchedulerState::Idle => {
                let delay = self.delay.sample(&mut self.rng);
                info!("Waiting for {} seconds...", delay.as_secs());
                self.clock.sleep(delay).await;
                SchedulerState::Active
            }
        }
    }

    /// Run until the process is terminated.
    pub async fn run(&mut self) {
        let mut state = SchedulerState::Active;
        loop {
            state = self.step(state).await;
        }
    }

    /// Run until `shutdown` resolves. The in-flight step is abandoned.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut state = SchedulerState::Active;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(state = %state, cycles = self.cycles_run, "Scheduler stopping");
                    break;
                }
                next = self.step(state) => state = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::clock::ManualClock;
    use crate::notification::Destination;
    use crate::screener::{ScanOutcome, ScanQuery};

    struct NeverCalledScreener(AtomicUsize);

    #[async_trait]
    impl Screener for NeverCalledScreener {
        async fn fetch_ranked_symbols(&self, _query: &ScanQuery) -> ScanOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            ScanOutcome::Empty {
                reason: "stub".into(),
            }
        }
    }

    struct PanickingScreener;

    #[async_trait]
    impl Screener for PanickingScreener {
        async fn fetch_ranked_symbols(&self, _query: &ScanQuery) -> ScanOutcome {
            panic!("screener blew up");
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn notify(&self, _destination: &Destination, _symbol: &str) -> NotifyOutcome {
            NotifyOutcome::Delivered
        }
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn monday_noon() -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2025, 1, 27, 12, 0, 0).unwrap()
    }

    fn client() -> ClientConfig {
        ClientConfig {
            name: "acme".into(),
            expiry: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            bot_token: "t".into(),
            chat_id: "c".into(),
            scanner_url: "https://chartink.com/screener/acme".into(),
            payload: "p".into(),
        }
    }

    fn scheduler(screener: Arc<dyn Screener>, clock: Arc<ManualClock>) -> Scheduler {
        let gate = CalendarGate::from_config(&ScheduleConfig::default(), &[]).unwrap();
        Scheduler::new(
            gate,
            ClientRegistry::new(vec![client()]),
            screener,
            Arc::new(SilentNotifier),
            clock,
            DelayRange::default(),
        )
        .with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::Idle.to_string(), "idle");
        assert_eq!(SchedulerState::Active.to_string(), "active");
    }

    #[test]
    fn test_delay_samples_within_range() {
        let range = DelayRange::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let d = range.sample(&mut rng).as_secs_f64();
            assert!((55.0..=65.0).contains(&d), "delay {} out of range", d);
        }
    }

    #[test]
    fn test_delay_degenerate_and_inverted_ranges() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(DelayRange::new(3.0, 3.0).sample(&mut rng), Duration::from_secs(3));
        assert_eq!(DelayRange::new(10.0, 2.0).sample(&mut rng), Duration::from_secs(10));
        assert_eq!(DelayRange::new(-5.0, 0.0).sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_delay_beyond_limit_is_capped() {
        let mut rng = StdRng::seed_from_u64(3);
        let cap = Duration::from_secs_f64(MAX_DELAY_SECS);
        assert_eq!(DelayRange::new(1e20, 1e20).sample(&mut rng), cap);
        assert!(DelayRange::new(10.0, 1e20).sample(&mut rng) <= cap);
    }

    #[tokio::test]
    async fn test_step_transitions() {
        let clock = Arc::new(ManualClock::new(monday_noon()));
        let screener = Arc::new(NeverCalledScreener(AtomicUsize::new(0)));
        let mut s = scheduler(screener.clone(), clock.clone());

        assert_eq!(s.step(SchedulerState::Active).await, SchedulerState::Idle);
        assert_eq!(s.cycles_run(), 1);
        assert_eq!(screener.0.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());

        assert_eq!(s.step(SchedulerState::Idle).await, SchedulerState::Active);
        let sleeps = clock.sleeps();
        assert_eq!(sleeps.len(), 1);
        assert!(sleeps[0] >= Duration::from_secs(55) && sleeps[0] <= Duration::from_secs(65));
    }

    #[tokio::test]
    async fn test_cycle_outside_hours_skips_clients() {
        let clock = Arc::new(ManualClock::new(
            ist().with_ymd_and_hms(2025, 1, 27, 18, 0, 0).unwrap(),
        ));
        let screener = Arc::new(NeverCalledScreener(AtomicUsize::new(0)));
        let s = scheduler(screener.clone(), clock);

        let report = s.run_cycle().await;
        assert_eq!(report.decision, GateDecision::OutsideSession);
        assert!(!report.ran());
        assert_eq!(screener.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_cycle_returns_to_idle() {
        let clock = Arc::new(ManualClock::new(monday_noon()));
        let mut s = scheduler(Arc::new(PanickingScreener), clock);

        assert_eq!(s.step(SchedulerState::Active).await, SchedulerState::Idle);
        assert_eq!(s.step(SchedulerState::Idle).await, SchedulerState::Active);
        assert_eq!(s.step(SchedulerState::Active).await, SchedulerState::Idle);
        assert_eq!(s.cycles_run(), 2);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(monday_noon()));
        let screener = Arc::new(NeverCalledScreener(AtomicUsize::new(0)));
        let mut s = scheduler(screener, clock);

        s.run_until(async {}).await;
        assert!(s.cycles_run() <= 1);
    }

    #[tokio::test]
    async fn test_run_keeps_cycling() {
        let clock = Arc::new(ManualClock::new(monday_noon()));
        let screener = Arc::new(NeverCalledScreener(AtomicUsize::new(0)));
        let mut s = scheduler(screener.clone(), clock.clone());

        let watched = screener.clone();
        s.run_until(async move {
            while watched.0.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await;

        assert!(screener.0.load(Ordering::SeqCst) >= 3);
        assert!(clock.sleeps().len() >= 2);
    }
}
