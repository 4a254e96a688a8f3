// src/config.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Taxon whose coverage is stored split by individual sequence.
pub const PARABACTEROIDES_MSK_9_14: u32 = 2849180;

pub const DEFAULT_SAMPLE_PREFIX: &str = "coverage_arrays_";
pub const DEFAULT_OUTPUT_PREFIX: &str = "coverage_";

/// Which of a sample's two array collections a key is looked up in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArraySource {
    #[default]
    Primary,
    Secondary,
}

/// How the coverage-array key of a taxon's regions is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CoverageKeyStrategy {
    /// One scaffold key for the whole taxon, from the taxon reference tables.
    ByScaffold,
    /// One key per region: field `field` of the region name split on
    /// `separator`, followed by `suffix`.
    ByRegionName {
        separator: String,
        field: usize,
        suffix: String,
        #[serde(default)]
        source: ArraySource,
    },
}

static BY_SCAFFOLD: CoverageKeyStrategy = CoverageKeyStrategy::ByScaffold;

impl CoverageKeyStrategy {
    /// Array key derived from a region name, for `ByRegionName`.
    pub fn region_key(&self, region_name: &str) -> Option<String> {
        match self {
            CoverageKeyStrategy::ByScaffold => None,
            CoverageKeyStrategy::ByRegionName {
                separator,
                field,
                suffix,
                ..
            } => region_name
                .split(separator.as_str())
                .nth(*field)
                .map(|part| format!("{part}{suffix}")),
        }
    }

    pub fn source(&self) -> ArraySource {
        match self {
            CoverageKeyStrategy::ByScaffold => ArraySource::Primary,
            CoverageKeyStrategy::ByRegionName { source, .. } => *source,
        }
    }
}

/// Settings for the coverage stage.
///
/// Any field missing from a JSON config file takes its default, so a file
/// that only sets `key_strategies` replaces the built-in table and nothing
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Taxa that do not use one scaffold key. Unlisted taxa use `ByScaffold`.
    pub key_strategies: BTreeMap<u32, CoverageKeyStrategy>,
    /// Stripped from `.npz` file stems to get the sample name.
    pub sample_prefix: String,
    /// Prepended to the sample name for output files.
    pub output_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut key_strategies = BTreeMap::new();
        key_strategies.insert(
            PARABACTEROIDES_MSK_9_14,
            CoverageKeyStrategy::ByRegionName {
                separator: ":".to_string(),
                field: 1,
                suffix: "_Parabacteroides_sp._MSK.9.14".to_string(),
                source: ArraySource::Secondary,
            },
        );
        Self {
            key_strategies,
            sample_prefix: DEFAULT_SAMPLE_PREFIX.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn strategy_for(&self, taxon_id: u32) -> &CoverageKeyStrategy {
        self.key_strategies.get(&taxon_id).unwrap_or(&BY_SCAFFOLD)
    }

    /// True when some strategy reads from the secondary collection.
    pub fn needs_secondary(&self) -> bool {
        self.key_strategies
            .values()
            .any(|s| s.source() == ArraySource::Secondary)
    }
}
