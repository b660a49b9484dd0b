use anyhow::Context;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use trajcore::batch::{SampleSource, WorkItemId};
use trajcore::interface::state_vector::{LoadedSamples, RawStateVectorSample};
use trajcore::prelude::{SoftIssue, StageResult, TrajectoryError};

/// One JSON array of state vectors per aircraft, one file per work item.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Work item ids are the `.json` file names under the root, sorted.
    pub fn discover(&self) -> anyhow::Result<Vec<WorkItemId>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("listing input directory {}", self.root.display()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("reading input directory {}", self.root.display()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(Path::new(id))
    }
}

impl SampleSource for FileSource {
    fn load(&self, id: &str) -> StageResult<LoadedSamples> {
        let path = self.path_for(id);
        let contents = fs::read_to_string(&path)
            .map_err(|err| TrajectoryError::Ingest(format!("{}: {err}", path.display())))?;
        let records: Vec<Value> = serde_json::from_str(&contents)
            .map_err(|err| TrajectoryError::Ingest(format!("{}: {err}", path.display())))?;
        Ok(decode_records(records))
    }
}

/// Decodes records field by field. A field that does not parse is dropped and
/// counted; a record without a usable `time` is dropped entirely.
pub fn decode_records(records: Vec<Value>) -> LoadedSamples {
    let mut samples = Vec::with_capacity(records.len());
    let mut rejected: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        let Value::Object(mut fields) = record else {
            *rejected.entry("record".into()).or_default() += 1;
            continue;
        };
        let bad: Vec<String> = fields
            .iter()
            .filter(|(key, value)| !field_parses(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in bad {
            fields.remove(&key);
            *rejected.entry(key).or_default() += 1;
        }
        if !fields.contains_key("time") {
            continue;
        }
        match serde_json::from_value::<RawStateVectorSample>(Value::Object(fields)) {
            Ok(sample) => samples.push(sample),
            Err(_) => *rejected.entry("record".into()).or_default() += 1,
        }
    }

    let issues = rejected
        .into_iter()
        .map(|(field, count)| SoftIssue::UnparseableField { field, count })
        .collect();
    LoadedSamples { samples, issues }
}

fn field_parses(key: &str, value: &Value) -> bool {
    let mut single = Map::new();
    single.insert(key.to_string(), value.clone());
    serde_json::from_value::<RawStateVectorSample>(Value::Object(single)).is_ok()
}
