use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::aggregate::{aggregate, AggregationResult, MissingPolicy};
use crate::backend::ChartBackend;
use crate::data::Properties;
use crate::page::Page;
use crate::selection::{ChartType, SelectionState};

/// Categorical palette for doughnut slices, cycled by index
pub const PALETTE: [&str; 10] = [
    "#419400", "#E1E6D9", "#343300", "#FF6384", "#36A2EB", "#FFCE56", "#FFA500", "#800080",
    "#008080", "#A52A2A",
];

/// Fill colour for every bar
pub const BAR_COLOR: &str = "#36A2EB";

// =============================================================================
// Chart configuration (the shape the charting library consumes)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub kind: ChartType,
    pub data: ChartData,
    pub options: ChartOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: BackgroundColor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BackgroundColor {
    Single(String),
    Palette(Vec<String>),
}

impl BackgroundColor {
    /// Colour of entry `index`
    pub fn at(&self, index: usize) -> &str {
        match self {
            BackgroundColor::Single(c) => c,
            BackgroundColor::Palette(p) if !p.is_empty() => &p[index % p.len()],
            BackgroundColor::Palette(_) => BAR_COLOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    pub responsive: bool,
    pub maintain_aspect_ratio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutout: Option<String>,
    pub plugins: Plugins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scales: Option<Scales>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plugins {
    pub title: Title,
    pub legend: Legend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Tooltip>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub display: bool,
    pub text: String,
    pub font: Font,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    pub size: u32,
    pub weight: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendPosition {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub position: LegendPosition,
}

/// Tooltip labels: precomputed `"{value} ({pct}%)"` per entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scales {
    pub x: Axis,
    pub y: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_at_zero: Option<bool>,
    pub title: AxisTitle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisTitle {
    pub display: bool,
    pub text: String,
}

/// Knobs that distinguish one renderer from another
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Show `value (pct%)` in tooltips and the doughnut legend
    pub percentages: bool,
    /// Treat empty strings, 0 and false as missing too
    pub falsy_as_missing: bool,
}

impl RendererOptions {
    pub fn missing_policy(&self) -> MissingPolicy {
        if self.falsy_as_missing {
            MissingPolicy::Falsy
        } else {
            MissingPolicy::Nullish
        }
    }
}

/// Build the chart configuration for an aggregation.
///
/// Bar charts need both keys; otherwise the doughnut layout is used.
pub fn build_config(
    x_key: &str,
    y_key: Option<&str>,
    chart_type: ChartType,
    result: AggregationResult,
    options: &RendererOptions,
) -> ChartConfig {
    match (chart_type, y_key) {
        (ChartType::Bar, Some(y_key)) => ChartConfig {
            kind: ChartType::Bar,
            data: ChartData {
                labels: result.labels,
                datasets: vec![Dataset {
                    label: y_key.to_string(),
                    data: result.values,
                    background_color: BackgroundColor::Single(BAR_COLOR.to_string()),
                }],
            },
            options: ChartOptions {
                responsive: true,
                maintain_aspect_ratio: false,
                cutout: None,
                plugins: Plugins {
                    title: title(format!("{} vs {}", y_key, x_key)),
                    legend: Legend {
                        position: LegendPosition::Top,
                    },
                    tooltip: None,
                },
                scales: Some(Scales {
                    x: Axis {
                        begin_at_zero: None,
                        title: AxisTitle {
                            display: true,
                            text: x_key.to_string(),
                        },
                    },
                    y: Axis {
                        begin_at_zero: Some(true),
                        title: AxisTitle {
                            display: true,
                            text: y_key.to_string(),
                        },
                    },
                }),
            },
        },
        _ => {
            let tooltip = options.percentages.then(|| Tooltip {
                labels: (0..result.len()).filter_map(|i| result.describe(i)).collect(),
            });
            doughnut_config(x_key, result, tooltip)
        }
    }
}

fn doughnut_config(x_key: &str, result: AggregationResult, tooltip: Option<Tooltip>) -> ChartConfig {
    ChartConfig {
        kind: ChartType::Doughnut,
        data: ChartData {
            labels: result.labels,
            datasets: vec![Dataset {
                label: x_key.to_string(),
                data: result.values,
                background_color: BackgroundColor::Palette(
                    PALETTE.iter().map(|c| c.to_string()).collect(),
                ),
            }],
        },
        options: ChartOptions {
            responsive: true,
            maintain_aspect_ratio: false,
            cutout: Some("50%".to_string()),
            plugins: Plugins {
                title: title(x_key.to_string()),
                legend: Legend {
                    position: LegendPosition::Bottom,
                },
                tooltip,
            },
            scales: None,
        },
    }
}

fn title(text: String) -> Title {
    Title {
        display: true,
        text,
        font: Font {
            size: 16,
            weight: "900".to_string(),
        },
    }
}

// =============================================================================
// Controller: owns at most one chart instance per canvas target
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAttribute,
    NoYKey,
    MissingCanvas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    Skipped(SkipReason),
}

pub struct ChartController<B: ChartBackend> {
    backend: B,
    options: RendererOptions,
    instances: HashMap<String, B::Instance>,
}

impl<B: ChartBackend> ChartController<B> {
    pub fn new(backend: B, options: RendererOptions) -> Self {
        Self {
            backend,
            options,
            instances: HashMap::new(),
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn instance(&self, target: &str) -> Option<&B::Instance> {
        self.instances.get(target)
    }

    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    /// Aggregate and draw `selection` onto `target`, replacing any chart
    /// already there. Skips without touching the page when keys are missing
    /// or the canvas does not exist.
    pub fn render(
        &mut self,
        page: &mut Page,
        target: &str,
        selection: &SelectionState,
        records: &[Properties],
    ) -> Result<RenderOutcome> {
        let Some(x_key) = selection.attribute.as_deref() else {
            debug!(canvas = target, "no attribute selected");
            return Ok(RenderOutcome::Skipped(SkipReason::NoAttribute));
        };
        if selection.chart_type == ChartType::Bar && selection.y_key.is_none() {
            debug!(canvas = target, "bar chart without a Y key");
            return Ok(RenderOutcome::Skipped(SkipReason::NoYKey));
        }
        if !page.has_canvas(target) {
            debug!(canvas = target, "canvas not on page");
            return Ok(RenderOutcome::Skipped(SkipReason::MissingCanvas));
        }

        page.hide_placeholder();

        let result = match aggregate(selection, records, self.options.missing_policy()) {
            Some(result) => result,
            None => return Ok(RenderOutcome::Skipped(SkipReason::NoAttribute)),
        };
        let config = build_config(
            x_key,
            selection.y_key.as_deref(),
            selection.chart_type,
            result,
            &self.options,
        );

        if let Some(previous) = self.instances.remove(target) {
            self.backend.destroy(previous)?;
        }
        let instance = self.backend.create(target, &config)?;
        self.instances.insert(target.to_string(), instance);

        info!(
            canvas = target,
            kind = %config.kind,
            title = %config.options.plugins.title.text,
            entries = config.data.labels.len(),
            "chart rendered"
        );
        Ok(RenderOutcome::Rendered)
    }

    /// Dispose of every live chart.
    pub fn clear(&mut self) -> Result<()> {
        for (_, instance) in self.instances.drain() {
            self.backend.destroy(instance)?;
        }
        Ok(())
    }
}
