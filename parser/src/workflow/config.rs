use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use trajcore::prelude::StageConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub threads: usize,
    /// Items handed to the scheduler per round; output is flushed between rounds.
    pub step_count: usize,
    pub stage: StageConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            step_count: 1000,
            stage: StageConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(threads: usize, step_count: usize, redundancy_filtration: bool) -> Self {
        Self {
            threads,
            step_count,
            stage: StageConfig {
                redundancy_filtration,
                ..StageConfig::default()
            },
        }
    }

    pub fn to_stage_config(&self) -> StageConfig {
        self.stage.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.threads.max(1)
    }

    pub fn round_size(&self) -> usize {
        self.step_count.max(1)
    }
}
