use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::chart::RendererOptions;
use crate::store::StorageKeys;
use crate::RenderOptions;

/// Element identifiers the page contract relies on
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElementIds {
    pub data: String,
    pub key_selector: String,
    pub y_selector: String,
    pub chart_type_selector: String,
    pub layer_selector: String,
    pub canvas: String,
    /// Second canvas driven by the broadcast selector
    pub secondary_canvas: String,
    pub placeholder: String,
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            data: "geojson-data".to_string(),
            key_selector: "key-selector".to_string(),
            y_selector: "y-axis-selector".to_string(),
            chart_type_selector: "chart-type-selector".to_string(),
            layer_selector: "layer-selector".to_string(),
            canvas: "pieChart".to_string(),
            secondary_canvas: "pieChart1".to_string(),
            placeholder: "chart-placeholder".to_string(),
        }
    }
}

/// Everything a page needs besides its data: ids, storage keys, renderer
/// knobs and output settings. Every section is optional in the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub elements: ElementIds,
    pub storage: StorageKeys,
    pub renderer: RendererOptions,
    pub render: RenderOptions,
}

impl PageConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid page configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutputFormat;

    #[test]
    fn test_empty_config_is_default() {
        let config = PageConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PageConfig::default());
        assert_eq!(config.elements.canvas, "pieChart");
        assert_eq!(config.storage.layer, "selectedSpatialLayer");
        assert_eq!(config.render.width, 800);
    }

    #[test]
    fn test_partial_overrides() {
        let config = PageConfig::from_json_str(
            r#"{
                "elements": {"canvas": "chart"},
                "storage": {"attribute": "attr"},
                "renderer": {"percentages": true},
                "render": {"width": 400, "type": "svg"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.elements.canvas, "chart");
        assert_eq!(config.elements.key_selector, "key-selector");
        assert_eq!(config.storage.attribute, "attr");
        assert_eq!(config.storage.chart_type, "selectedChartType");
        assert!(config.renderer.percentages);
        assert_eq!(config.render.width, 400);
        assert_eq!(config.render.height, 600);
        assert_eq!(config.render.format, OutputFormat::Svg);
    }

    #[test]
    fn test_invalid_config() {
        let err = PageConfig::from_json_str("{\"render\": {\"width\": \"wide\"}}").unwrap_err();
        assert!(err.to_string().contains("Invalid page configuration"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(PageConfig::load("/definitely/not/here.json").is_err());
    }
}
