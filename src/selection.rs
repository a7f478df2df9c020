use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{KeyValueStore, StorageKeys};

/// Chart flavour chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Doughnut,
    Bar,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Doughnut => "doughnut",
            ChartType::Bar => "bar",
        }
    }

    pub fn all() -> [ChartType; 2] {
        [ChartType::Doughnut, ChartType::Bar]
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "doughnut" | "pie" => Ok(ChartType::Doughnut),
            "bar" => Ok(ChartType::Bar),
            other => Err(anyhow!("Unknown chart type '{}' (expected doughnut or bar)", other)),
        }
    }
}

/// What the user has picked: X attribute, Y key (bar only) and chart type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pub attribute: Option<String>,
    pub y_key: Option<String>,
    pub chart_type: ChartType,
}

impl SelectionState {
    pub fn categorical(attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            y_key: None,
            chart_type: ChartType::Doughnut,
        }
    }

    pub fn bar(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            attribute: Some(x.into()),
            y_key: Some(y.into()),
            chart_type: ChartType::Bar,
        }
    }

    /// Read the last persisted selection. Empty strings count as unset and
    /// unknown chart types fall back to doughnut.
    pub fn restore(store: &dyn KeyValueStore, keys: &StorageKeys) -> Self {
        let read = |key: &str| store.get(key).filter(|v| !v.is_empty());

        Self {
            attribute: read(&keys.attribute),
            y_key: read(&keys.y_key),
            chart_type: read(&keys.chart_type)
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Write every field back; unset keys are stored as empty strings.
    pub fn persist(&self, store: &mut dyn KeyValueStore, keys: &StorageKeys) -> Result<()> {
        store.set(&keys.attribute, self.attribute.as_deref().unwrap_or(""))?;
        store.set(&keys.chart_type, self.chart_type.as_str())?;
        store.set(&keys.y_key, self.y_key.as_deref().unwrap_or(""))?;
        Ok(())
    }

    /// Whether this selection has enough keys to draw anything.
    pub fn is_renderable(&self) -> bool {
        match self.chart_type {
            ChartType::Doughnut => self.attribute.is_some(),
            ChartType::Bar => self.attribute.is_some() && self.y_key.is_some(),
        }
    }
}
