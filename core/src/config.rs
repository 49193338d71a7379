use crate::schema::normalize_header;
use crate::types::{Category, Points};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happens to points earned beyond the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapPolicy {
    /// `current` is clamped and the excess is kept in the overflow column.
    #[default]
    TrackOverflow,
    /// `current` is clamped and the excess is not recorded anywhere.
    HardClamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
}

/// One candidate table feeding a point category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTableConfig {
    pub table: String,
    pub category: Category,
    /// Sum numeric and checkbox cells when the table has no points column.
    #[serde(default = "default_true")]
    pub fallback_sum: bool,
    /// Points a checked box is worth, by column header (matched after
    /// header normalization). Unlisted columns: 1.
    #[serde(default)]
    pub checkbox_points: HashMap<String, Points>,
    /// Headers never summed by the fallback (dates, notes, ids).
    #[serde(default)]
    pub ignore_columns: Vec<String>,
}

impl SourceTableConfig {
    pub fn new(table: impl Into<String>, category: Category) -> Self {
        Self {
            table: table.into(),
            category,
            fallback_sum: true,
            checkbox_points: HashMap::new(),
            ignore_columns: Vec::new(),
        }
    }

    pub fn checkbox_value(&self, header: &str) -> Points {
        let wanted = normalize_header(header);
        self.checkbox_points
            .iter()
            .find(|(key, _)| normalize_header(key) == wanted)
            .map(|(_, points)| *points)
            .unwrap_or(1)
    }
}

fn default_true() -> bool {
    true
}

fn default_cap() -> Points {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_cap")]
    pub cap: Points,
    #[serde(default)]
    pub cap_policy: CapPolicy,
    pub ledger_table: String,
    pub redemption_table: String,
    pub roster: RosterConfig,
    pub sources: Vec<SourceTableConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cap: default_cap(),
            cap_policy: CapPolicy::TrackOverflow,
            ledger_table: "BP_Total".into(),
            redemption_table: "BP_Redemptions".into(),
            roster: RosterConfig {
                primary: "Player Roster".into(),
                secondary: Some("Members".into()),
            },
            sources: vec![
                SourceTableConfig::new("Attendance Missions", Category::Attendance),
                SourceTableConfig::new("Flag Missions", Category::Flag),
                SourceTableConfig::new("Dice Roll Points", Category::Dice),
                SourceTableConfig::new("Dice Points (Legacy)", Category::Dice),
            ],
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing optional keys take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cap < 0 {
            anyhow::bail!("cap must be non-negative, got {}", self.cap);
        }
        if self.sources.is_empty() {
            anyhow::bail!("at least one source table must be configured");
        }
        if self.ledger_table.trim().is_empty() || self.redemption_table.trim().is_empty() {
            anyhow::bail!("ledger_table and redemption_table must be named");
        }
        Ok(())
    }

    pub fn sources_for(&self, category: Category) -> impl Iterator<Item = &SourceTableConfig> {
        self.sources.iter().filter(move |s| s.category == category)
    }

    pub fn is_source_table(&self, table: &str) -> bool {
        self.sources.iter().any(|s| s.table == table)
    }

    /// Roster tables in lookup order.
    pub fn roster_tables(&self) -> Vec<String> {
        std::iter::once(self.roster.primary.clone())
            .chain(self.roster.secondary.clone())
            .collect()
    }
}
