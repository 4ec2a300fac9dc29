//! Threshold alerts and the traffic-light alert level.

use chrono::{DateTime, Utc};
use pl_types::RiskThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::metrics::RiskMeasures;

/// Severity of a single alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Medium,
    High,
}

/// Overall portfolio alert level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Green,
    Yellow,
    Red,
}

impl AlertLevel {
    /// Red if any alert is High, Yellow if any is Medium, else Green.
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        match alerts.iter().map(|a| a.severity).max() {
            Some(AlertSeverity::High) => AlertLevel::Red,
            Some(AlertSeverity::Medium) => AlertLevel::Yellow,
            None => AlertLevel::Green,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertLevel::Green => "GREEN",
            AlertLevel::Yellow => "YELLOW",
            AlertLevel::Red => "RED",
        };
        write!(f, "{}", s)
    }
}

/// Discriminant of an alert, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    VarExceeded,
    DrawdownExceeded,
    ConcentrationExceeded,
    HighVolatility,
}

/// What breached, with the observed value and the limit it was held to.
/// All figures are fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertKind {
    VarExceeded { var_pct: f64, limit_pct: f64 },
    DrawdownExceeded { drawdown: f64, limit: f64 },
    ConcentrationExceeded { concentration: f64, limit: f64 },
    HighVolatility { volatility: f64, limit: f64 },
}

impl AlertKind {
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertKind::VarExceeded { .. } => AlertType::VarExceeded,
            AlertKind::DrawdownExceeded { .. } => AlertType::DrawdownExceeded,
            AlertKind::ConcentrationExceeded { .. } => AlertType::ConcentrationExceeded,
            AlertKind::HighVolatility { .. } => AlertType::HighVolatility,
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertKind::VarExceeded { .. } | AlertKind::DrawdownExceeded { .. } => AlertSeverity::High,
            AlertKind::ConcentrationExceeded { .. } | AlertKind::HighVolatility { .. } => {
                AlertSeverity::Medium
            }
        }
    }

    fn message(&self) -> String {
        match self {
            AlertKind::VarExceeded { var_pct, limit_pct } => format!(
                "Value at Risk ({:.2}%) exceeds threshold ({:.2}%)",
                var_pct * 100.0,
                limit_pct * 100.0
            ),
            AlertKind::DrawdownExceeded { drawdown, limit } => format!(
                "Portfolio drawdown ({:.2}%) exceeds maximum ({:.2}%)",
                drawdown * 100.0,
                limit * 100.0
            ),
            AlertKind::ConcentrationExceeded {
                concentration,
                limit,
            } => format!(
                "Asset concentration ({:.2}%) exceeds maximum ({:.2}%)",
                concentration * 100.0,
                limit * 100.0
            ),
            AlertKind::HighVolatility { volatility, limit } => format!(
                "Portfolio volatility ({:.2}%) is above the daily limit ({:.2}%)",
                volatility * 100.0,
                limit * 100.0
            ),
        }
    }
}

/// A single threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            severity: kind.severity(),
            message: kind.message(),
            kind,
        }
    }

    pub fn alert_type(&self) -> AlertType {
        self.kind.alert_type()
    }
}

/// Stateless threshold checks.
pub struct AlertEvaluator;

impl AlertEvaluator {
    /// Alerts for every measure strictly above its limit, in the fixed order
    /// VaR, drawdown, concentration, volatility.
    pub fn evaluate(
        measures: &RiskMeasures,
        thresholds: &RiskThresholds,
        as_of: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        // --- VaR ---
        if measures.value_at_risk_pct > thresholds.max_drawdown {
            alerts.push(Alert::new(
                AlertKind::VarExceeded {
                    var_pct: measures.value_at_risk_pct,
                    limit_pct: thresholds.max_drawdown,
                },
                as_of,
            ));
        }

        // --- drawdown ---
        if measures.drawdown > thresholds.max_drawdown {
            alerts.push(Alert::new(
                AlertKind::DrawdownExceeded {
                    drawdown: measures.drawdown,
                    limit: thresholds.max_drawdown,
                },
                as_of,
            ));
        }

        // --- concentration ---
        if measures.concentration > thresholds.max_concentration {
            alerts.push(Alert::new(
                AlertKind::ConcentrationExceeded {
                    concentration: measures.concentration,
                    limit: thresholds.max_concentration,
                },
                as_of,
            ));
        }

        // --- volatility ---
        if measures.volatility > thresholds.daily_volatility {
            alerts.push(Alert::new(
                AlertKind::HighVolatility {
                    volatility: measures.volatility,
                    limit: thresholds.daily_volatility,
                },
                as_of,
            ));
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap()
    }

    fn measures(var: bool, drawdown: bool, concentration: bool, volatility: bool) -> RiskMeasures {
        let t = RiskThresholds::default();
        let pick = |breach: bool, limit: f64| if breach { limit * 1.5 } else { limit * 0.5 };
        RiskMeasures {
            value_at_risk: 0.0,
            value_at_risk_pct: pick(var, t.max_drawdown),
            drawdown: pick(drawdown, t.max_drawdown),
            concentration: pick(concentration, t.max_concentration),
            volatility: pick(volatility, t.daily_volatility),
        }
    }

    #[test]
    fn every_threshold_combination_maps_to_the_right_level() {
        let thresholds = RiskThresholds::default();
        for mask in 0u8..16 {
            let (var, dd, conc, vol) = (mask & 1 != 0, mask & 2 != 0, mask & 4 != 0, mask & 8 != 0);
            let alerts = AlertEvaluator::evaluate(&measures(var, dd, conc, vol), &thresholds, as_of());

            let expected_types: Vec<AlertType> = [
                (var, AlertType::VarExceeded),
                (dd, AlertType::DrawdownExceeded),
                (conc, AlertType::ConcentrationExceeded),
                (vol, AlertType::HighVolatility),
            ]
            .iter()
            .filter(|(hit, _)| *hit)
            .map(|(_, t)| *t)
            .collect();
            let got: Vec<AlertType> = alerts.iter().map(|a| a.alert_type()).collect();
            assert_eq!(got, expected_types, "mask {mask:04b}");

            let expected_level = if var || dd {
                AlertLevel::Red
            } else if conc || vol {
                AlertLevel::Yellow
            } else {
                AlertLevel::Green
            };
            assert_eq!(AlertLevel::from_alerts(&alerts), expected_level, "mask {mask:04b}");
        }
    }

    #[test]
    fn threshold_equality_does_not_alert() {
        let t = RiskThresholds::default();
        let at_limit = RiskMeasures {
            value_at_risk: 0.0,
            value_at_risk_pct: t.max_drawdown,
            drawdown: t.max_drawdown,
            concentration: t.max_concentration,
            volatility: t.daily_volatility,
        };
        assert!(AlertEvaluator::evaluate(&at_limit, &t, as_of()).is_empty());
    }

    #[test]
    fn severities_follow_the_alert_table() {
        let alerts = AlertEvaluator::evaluate(
            &measures(true, true, true, true),
            &RiskThresholds::default(),
            as_of(),
        );
        let severities: Vec<AlertSeverity> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![
                AlertSeverity::High,
                AlertSeverity::High,
                AlertSeverity::Medium,
                AlertSeverity::Medium
            ]
        );
        assert!(alerts.iter().all(|a| a.timestamp == as_of()));
    }

    #[test]
    fn message_reports_percentages() {
        let alert = Alert::new(
            AlertKind::VarExceeded {
                var_pct: 0.2,
                limit_pct: 0.15,
            },
            as_of(),
        );
        assert_eq!(alert.message, "Value at Risk (20.00%) exceeds threshold (15.00%)");
        assert_eq!(alert.severity, AlertSeverity::High);
    }

    #[test]
    fn ordering_and_display() {
        assert!(AlertSeverity::Medium < AlertSeverity::High);
        assert!(AlertLevel::Green < AlertLevel::Yellow);
        assert_eq!(AlertLevel::Red.to_string(), "RED");
        assert_eq!(serde_json::to_string(&AlertLevel::Yellow).unwrap(), "\"YELLOW\"");
        assert_eq!(
            serde_json::to_string(&AlertType::HighVolatility).unwrap(),
            "\"HIGH_VOLATILITY\""
        );
    }
}
