//! Periodic trigger for eviction passes and handler for popup actions

use crate::classifier::Classifier;
use crate::classifier::oracle::HttpTransport;
use crate::error::{BrowserError, Error};
use crate::eviction::{EvictionPolicy, PassReport, TabControl};
use crate::history::HistoryStore;
use crate::storage::{StateStore, Storage};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

pub const ALARM_NAME: &str = "checkIdleTabs";
pub const CHECK_PERIOD_MINUTES: f64 = 1.0;

/// Named periodic alarms
#[async_trait(?Send)]
pub trait Timer {
    async fn schedule(&self, name: &str, period_minutes: f64) -> Result<(), BrowserError>;
}

/// Milliseconds since the epoch
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Message sent from the popup to the background worker
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
    ReclassifyHistory,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    fn ok() -> Self {
        ActionResponse {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        ActionResponse {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Clears the in-flight flag when a pass finishes, even on early return
pub(crate) struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Owns the browser collaborators and runs at most one pass at a time
pub struct SchedulerDriver {
    storage: Box<dyn Storage>,
    tabs: Box<dyn TabControl>,
    timer: Box<dyn Timer>,
    transport: Box<dyn HttpTransport>,
    clock: Box<dyn Clock>,
    in_flight: Cell<bool>,
}

impl SchedulerDriver {
    pub fn new(
        storage: Box<dyn Storage>,
        tabs: Box<dyn TabControl>,
        timer: Box<dyn Timer>,
        transport: Box<dyn HttpTransport>,
        clock: Box<dyn Clock>,
    ) -> Self {
        SchedulerDriver {
            storage,
            tabs,
            timer,
            transport,
            clock,
            in_flight: Cell::new(false),
        }
    }

    pub fn state(&self) -> StateStore<'_> {
        StateStore::new(self.storage.as_ref())
    }

    pub fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Seed missing state and arm the periodic alarm
    pub async fn on_startup(&self) -> Result<(), Error> {
        self.state().ensure_defaults().await?;
        self.timer.schedule(ALARM_NAME, CHECK_PERIOD_MINUTES).await?;
        info!("Scheduled '{}' every {} minute(s)", ALARM_NAME, CHECK_PERIOD_MINUTES);
        Ok(())
    }

    pub(crate) fn try_begin(&self) -> Option<PassGuard<'_>> {
        if self.in_flight.replace(true) {
            None
        } else {
            Some(PassGuard(&self.in_flight))
        }
    }

    /// Run one eviction pass for our alarm
    ///
    /// Returns `None` for foreign alarms, when a pass is already running, or
    /// when the pass failed before selecting tabs; the next tick retries.
    pub async fn on_alarm(&self, name: &str) -> Option<PassReport> {
        if name != ALARM_NAME {
            debug!("Ignoring alarm '{}'", name);
            return None;
        }

        let Some(_guard) = self.try_begin() else {
            warn!("Previous eviction pass still running, skipping this tick");
            return None;
        };

        let state = self.state();
        let classifier = Classifier::new(self.transport.as_ref());
        let history = HistoryStore::new(&state, &classifier);
        let policy = EvictionPolicy::new(self.tabs.as_ref(), &state, &history);

        match policy.run_pass(self.now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Eviction pass failed: {}", e);
                None
            }
        }
    }

    pub async fn handle_action(&self, action: Action) -> ActionResponse {
        match action {
            Action::ReclassifyHistory => {
                let state = self.state();
                let classifier = Classifier::new(self.transport.as_ref());
                let history = HistoryStore::new(&state, &classifier);

                match history.reclassify_all().await {
                    Ok(_) => ActionResponse::ok(),
                    Err(e) => {
                        error!("Reclassification failed: {}", e);
                        ActionResponse::failed(e)
                    }
                }
            }
        }
    }
}
