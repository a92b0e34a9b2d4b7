/// Risk rule table: ordered threshold rules per scoring category.
///
/// Every category is a linearly scanned list where the first matching rule
/// wins. The scan never sorts, so list order is part of the rule set:
///
/// - rainfall (24h / 72h): `min <= observed`, lists descending by `min`
/// - elevation:            `max >= observed`, list ascending by `max`
/// - season:               `months` contains the current month
/// - historical floods:    `min_floods <= count`, list descending
/// - risk tiers:           `min_score <= total`, list descending
///
/// `validate` enforces those orderings for tables loaded from disk
/// (`risk_rules.toml`). Tables built in code are scanned as given.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::ConfigError;
use crate::model::RiskLevel;

// ---------------------------------------------------------------------------
// Rule types
// ---------------------------------------------------------------------------

/// Common shape of a scoring rule: a predicate over an observed value and
/// the outcome it yields when it matches.
pub trait ScoringRule {
    type Observed: ?Sized;

    fn matches(&self, observed: &Self::Observed) -> bool;
    fn score(&self) -> u32;
    fn label(&self) -> &str;
}

/// Returns the first rule in `rules` that matches, in stored order.
pub fn first_match<'a, R: ScoringRule>(rules: &'a [R], observed: &R::Observed) -> Option<&'a R> {
    rules.iter().find(|rule| rule.matches(observed))
}

/// Rainfall rule: matches when the observed amount (mm) is at least `min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub min: f64,
    pub score: u32,
    pub label: String,
}

impl ScoringRule for ThresholdRule {
    type Observed = f64;

    fn matches(&self, observed: &f64) -> bool {
        *observed >= self.min
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Elevation rule: matches when the location sits at or below `max` meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationRule {
    pub max: f64,
    pub score: u32,
    pub label: String,
}

impl ScoringRule for ElevationRule {
    type Observed = f64;

    fn matches(&self, observed: &f64) -> bool {
        *observed <= self.max
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Season rule: matches when the calendar month (1-12) is in `months`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRule {
    pub months: Vec<u32>,
    pub score: u32,
    pub label: String,
}

impl ScoringRule for SeasonRule {
    type Observed = u32;

    fn matches(&self, month: &u32) -> bool {
        self.months.contains(month)
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Historical frequency rule: matches when at least `min_floods` floods
/// were recorded inside the lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFloodRule {
    pub min_floods: u32,
    pub score: u32,
    pub label: String,
}

impl ScoringRule for HistoricalFloodRule {
    type Observed = u32;

    fn matches(&self, count: &u32) -> bool {
        *count >= self.min_floods
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// A risk tier, selected by total score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    pub min_score: u32,
    pub level: RiskLevel,
    pub color: String,
    pub action: String,
}

impl RiskTier {
    /// Tier used when a table has no tiers at all.
    pub fn baseline() -> Self {
        RiskTier {
            min_score: 0,
            level: RiskLevel::Low,
            color: "green".to_string(),
            action: "Normal conditions. Continue routine monitoring.".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

fn default_window_years() -> u32 {
    5
}

/// The complete, versioned set of scoring rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub version: String,
    /// Lookback used when counting historical floods.
    #[serde(default = "default_window_years")]
    pub historical_window_years: u32,
    pub rainfall_24h: Vec<ThresholdRule>,
    pub rainfall_72h: Vec<ThresholdRule>,
    pub elevation: Vec<ElevationRule>,
    pub season: Vec<SeasonRule>,
    pub historical_floods: Vec<HistoricalFloodRule>,
    pub risk_tiers: Vec<RiskTier>,
}

impl RuleTable {
    /// Resolves the tier for a total score: first tier whose `min_score`
    /// is reached, else the last (lowest-severity) tier.
    pub fn resolve_tier(&self, total_score: u32) -> RiskTier {
        self.risk_tiers
            .iter()
            .find(|tier| total_score >= tier.min_score)
            .or_else(|| self.risk_tiers.last())
            .cloned()
            .unwrap_or_else(RiskTier::baseline)
    }

    /// Checks the ordering and polarity every category relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("rule table version must not be empty".to_string());
        }
        if self.historical_window_years == 0 {
            return Err("historical_window_years must be at least 1".to_string());
        }
        if self.risk_tiers.is_empty() {
            return Err("at least one risk tier is required".to_string());
        }

        strictly_descending("rainfall_24h", self.rainfall_24h.iter().map(|r| r.min))?;
        strictly_descending("rainfall_72h", self.rainfall_72h.iter().map(|r| r.min))?;
        strictly_descending(
            "historical_floods",
            self.historical_floods.iter().map(|r| r.min_floods as f64),
        )?;
        strictly_descending("risk_tiers", self.risk_tiers.iter().map(|t| t.min_score as f64))?;

        let mut previous: Option<f64> = None;
        for rule in &self.elevation {
            if !rule.max.is_finite() {
                return Err(format!("elevation: threshold {} is not finite", rule.max));
            }
            if let Some(prev) = previous {
                if rule.max <= prev {
                    return Err(format!(
                        "elevation: thresholds must ascend ({} follows {})",
                        rule.max, prev
                    ));
                }
            }
            previous = Some(rule.max);
        }

        for rule in &self.season {
            if rule.months.is_empty() {
                return Err(format!("season '{}': no months listed", rule.label));
            }
            if let Some(bad) = rule.months.iter().find(|m| !(1..=12).contains(*m)) {
                return Err(format!("season '{}': month {} out of range", rule.label, bad));
            }
        }

        Ok(())
    }
}

fn strictly_descending(category: &str, thresholds: impl Iterator<Item = f64>) -> Result<(), String> {
    let mut previous: Option<f64> = None;
    for threshold in thresholds {
        if !threshold.is_finite() {
            return Err(format!("{}: threshold {} is not finite", category, threshold));
        }
        if let Some(prev) = previous {
            if threshold >= prev {
                return Err(format!(
                    "{}: thresholds must descend ({} follows {})",
                    category, threshold, prev
                ));
            }
        }
        previous = Some(threshold);
    }
    Ok(())
}

fn threshold(min: f64, score: u32, label: &str) -> ThresholdRule {
    ThresholdRule { min, score, label: label.to_string() }
}

impl Default for RuleTable {
    /// Built-in rule set, identical to the shipped `risk_rules.toml`.
    fn default() -> Self {
        RuleTable {
            version: "2024.1".to_string(),
            historical_window_years: default_window_years(),
            rainfall_24h: vec![
                threshold(100.0, 40, "Extreme 24h rainfall"),
                threshold(50.0, 30, "Heavy 24h rainfall"),
                threshold(25.0, 20, "Moderate 24h rainfall"),
                threshold(10.0, 10, "Light 24h rainfall"),
            ],
            rainfall_72h: vec![
                threshold(200.0, 30, "Extreme 72h rainfall"),
                threshold(100.0, 20, "Heavy 72h rainfall"),
                threshold(50.0, 10, "Moderate 72h rainfall"),
            ],
            elevation: vec![
                ElevationRule { max: 10.0, score: 30, label: "Very low elevation".to_string() },
                ElevationRule { max: 50.0, score: 20, label: "Low elevation".to_string() },
                ElevationRule { max: 100.0, score: 10, label: "Moderate elevation".to_string() },
            ],
            season: vec![
                SeasonRule {
                    months: vec![6, 7, 8, 9],
                    score: 15,
                    label: "Monsoon season".to_string(),
                },
                SeasonRule {
                    months: vec![10, 11],
                    score: 10,
                    label: "Post-monsoon season".to_string(),
                },
                SeasonRule {
                    months: vec![3, 4, 5],
                    score: 5,
                    label: "Pre-monsoon season".to_string(),
                },
            ],
            historical_floods: vec![
                HistoricalFloodRule { min_floods: 5, score: 25, label: "Frequent flooding history".to_string() },
                HistoricalFloodRule { min_floods: 3, score: 15, label: "Moderate flooding history".to_string() },
                HistoricalFloodRule { min_floods: 1, score: 5, label: "Some flooding history".to_string() },
            ],
            risk_tiers: vec![
                RiskTier {
                    min_score: 80,
                    level: RiskLevel::Critical,
                    color: "darkred".to_string(),
                    action: "Evacuate low-lying areas immediately and follow emergency instructions.".to_string(),
                },
                RiskTier {
                    min_score: 60,
                    level: RiskLevel::High,
                    color: "red".to_string(),
                    action: "Prepare for evacuation and move valuables to higher ground.".to_string(),
                },
                RiskTier {
                    min_score: 35,
                    level: RiskLevel::Medium,
                    color: "orange".to_string(),
                    action: "Stay alert, monitor updates and review emergency plans.".to_string(),
                },
                RiskTier::baseline(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a rule table from TOML text and validates it.
pub fn parse_rules(contents: &str) -> Result<RuleTable, ConfigError> {
    parse_rules_from(contents, "<inline>")
}

fn parse_rules_from(contents: &str, origin: &str) -> Result<RuleTable, ConfigError> {
    let table: RuleTable = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        source: e,
    })?;
    table.validate().map_err(ConfigError::InvalidRules)?;
    Ok(table)
}

/// Loads and validates a rule table from a TOML file.
pub fn load_rules(path: impl AsRef<Path>) -> Result<RuleTable, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let table = parse_rules_from(&contents, &path.display().to_string())?;
    log::info!("Loaded risk rules version {} from {}", table.version, path.display());
    Ok(table)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
