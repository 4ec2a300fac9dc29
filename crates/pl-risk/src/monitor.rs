//! Risk monitor: assessment plus alert publication.
//!
//! The [`RiskMonitor`] runs a [`RiskMetricsEngine`] assessment and forwards
//! every resulting [`Alert`] on a channel. It keeps nothing between calls.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use pl_data::MarketDataSource;
use pl_types::{PlResult, Position};
use tracing::{info, warn};

use crate::alerts::{Alert, AlertSeverity};
use crate::metrics::{RiskMetricsEngine, RiskProfile};

pub struct RiskMonitor {
    engine: RiskMetricsEngine,
    alert_tx: Sender<Alert>,
}

impl RiskMonitor {
    pub fn new(engine: RiskMetricsEngine, alert_tx: Sender<Alert>) -> Self {
        Self { engine, alert_tx }
    }

    /// Assess `positions` and publish the resulting alerts.
    pub fn update(
        &self,
        positions: &[Position],
        market: &dyn MarketDataSource,
        as_of: DateTime<Utc>,
    ) -> PlResult<RiskProfile> {
        let profile = self.engine.assess(positions, market, as_of)?;
        self.publish(&profile);
        Ok(profile)
    }

    /// Publish every alert of an already computed profile.
    pub fn publish(&self, profile: &RiskProfile) {
        for alert in &profile.alerts {
            self.emit(alert.clone());
        }
    }

    fn emit(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::High => warn!(%alert.message, "RISK HIGH"),
            AlertSeverity::Medium => info!(%alert.message, "RISK MEDIUM"),
        }
        // Best-effort send; a dropped receiver is not an error.
        let _ = self.alert_tx.try_send(alert);
    }
}
