use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chart::ChartConfig;
use crate::graph;
use crate::RenderOptions;

/// The charting library seam: build a chart from a config, dispose of it later.
pub trait ChartBackend {
    type Instance;

    fn create(&mut self, target: &str, config: &ChartConfig) -> Result<Self::Instance>;
    fn destroy(&mut self, instance: Self::Instance) -> Result<()>;
}

/// A chart drawn to `<out_dir>/<target>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Writes each chart as PNG, SVG or Chart.js JSON into a directory.
/// Destroying a chart deletes its file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    out_dir: PathBuf,
    options: RenderOptions,
}

impl FileBackend {
    pub fn new(out_dir: impl Into<PathBuf>, options: RenderOptions) -> Self {
        Self {
            out_dir: out_dir.into(),
            options,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path_for(&self, target: &str) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", target, self.options.format.extension()))
    }
}

impl ChartBackend for FileBackend {
    type Instance = RenderedFile;

    fn create(&mut self, target: &str, config: &ChartConfig) -> Result<RenderedFile> {
        let bytes = graph::render_chart(config, &self.options)?;

        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create {}", self.out_dir.display()))?;
        let path = self.path_for(target);
        fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write chart {}", path.display()))?;

        debug!(path = %path.display(), bytes = bytes.len(), "chart written");
        Ok(RenderedFile {
            path,
            bytes: bytes.len(),
        })
    }

    fn destroy(&mut self, instance: RenderedFile) -> Result<()> {
        match fs::remove_file(&instance.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove chart {}", instance.path.display()))),
        }
    }
}

/// In-memory backend that keeps every config it was handed
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u64,
    live: HashMap<u64, String>,
    history: Vec<(String, ChartConfig)>,
    destroyed: usize,
}

/// Handle to a chart held by [`RecordingBackend`]
#[derive(Debug, PartialEq, Eq)]
pub struct RecordedChart {
    pub id: u64,
    pub target: String,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.history.len()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn history(&self) -> &[(String, ChartConfig)] {
        &self.history
    }

    /// Most recent config drawn on `target`
    pub fn last_config(&self, target: &str) -> Option<&ChartConfig> {
        self.history
            .iter()
            .rev()
            .find(|(t, _)| t == target)
            .map(|(_, c)| c)
    }
}

impl ChartBackend for RecordingBackend {
    type Instance = RecordedChart;

    fn create(&mut self, target: &str, config: &ChartConfig) -> Result<RecordedChart> {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, target.to_string());
        self.history.push((target.to_string(), config.clone()));
        Ok(RecordedChart {
            id,
            target: target.to_string(),
        })
    }

    fn destroy(&mut self, instance: RecordedChart) -> Result<()> {
        if self.live.remove(&instance.id).is_some() {
            self.destroyed += 1;
        }
        Ok(())
    }
}
