//! scanwatch - stock screener alerts for subscriber chats.
//!
//! Polls a screener on a jittered cadence during market hours and pushes
//! the cheapest matching symbols to each subscriber's Telegram chat.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Scheduler                             │
//! │   Idle ──(55-65s)──▶ Active ──(cycle done)──▶ Idle           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  CalendarGate ─▶ ClientRegistry ─▶ Screener ─▶ Notifier × N  │
//! │  holiday/weekend   insertion order   top 10     chart +      │
//! │  /session window   expiry check      by close   caption      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod calendar;
pub mod clock;
pub mod notification;
pub mod registry;
pub mod scheduler;
pub mod screener;

use anyhow::{Context, Result};
use std::sync::Arc;

use scanwatch_common::AppConfig;

use crate::calendar::CalendarGate;
use crate::clock::{Clock, SystemClock};
use crate::notification::{ChartNotifier, PlaceholderChartRenderer, TelegramTransport};
use crate::registry::ClientRegistry;
use crate::scheduler::{CycleReport, DelayRange, Scheduler};
use crate::screener::ChartinkScreener;

/// The assembled service.
pub struct ScanwatchService {
    scheduler: Scheduler,
}

impl ScanwatchService {
    /// Wire the production collaborators from a validated config.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let gate = CalendarGate::from_config(&config.schedule, &config.holidays)
            .context("Failed to build calendar gate")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(gate.zone()));
        let registry = ClientRegistry::from(config.clients.clone());

        let today = gate.today(&clock.now());
        tracing::info!(
            clients = registry.len(),
            active = registry.active_on(today),
            holidays = gate.holidays().len(),
            test_mode = config.schedule.test_mode,
            run_on_weekends = config.schedule.run_on_weekends,
            "Registry loaded"
        );
        if registry.is_empty() {
            tracing::warn!("No clients configured; cycles will do nothing");
        }

        let screener = Arc::new(ChartinkScreener::new(&config.screener));
        let transport = TelegramTransport::new(&config.notifier)
            .context("Failed to build Telegram HTTP client")?;
        let notifier = Arc::new(ChartNotifier::new(
            PlaceholderChartRenderer::new(),
            transport,
            config.notifier.caption_prefix.clone(),
        ));

        let scheduler = Scheduler::new(
            gate,
            registry,
            screener,
            notifier,
            clock,
            DelayRange::from_config(&config.schedule),
        );

        Ok(Self { scheduler })
    }

    /// Run a single cycle and return its counters.
    pub async fn run_once(&self) -> CycleReport {
        self.scheduler.run_cycle().await
    }

    /// Run until Ctrl-C.
    pub async fn start(mut self) -> Result<()> {
        self.scheduler
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        Ok(())
    }
}
