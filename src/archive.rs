use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::{Arc, Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Paper, SearchType, identity_key, iso_timestamp};
use crate::error::HarvestError;
use crate::fs_util::{sanitize_file_name, write_bytes_atomic};
use crate::paths::PathResolver;

pub const RECORD_CREATED_AT: &str = "recordCreatedAt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub search_name: String,
    pub search_type: SearchType,
    pub query: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub file_path: String,
    pub new_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFile {
    pub search_name: String,
    pub search_type: SearchType,
    pub query: String,
    pub max_results: u32,
    pub updated_at: String,
    pub paper_count: usize,
    #[serde(default)]
    pub papers: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPaper {
    #[serde(flatten)]
    pub paper: Paper,
    #[serde(default)]
    pub record_created_at: String,
}

impl ArchiveFile {
    pub fn stored_papers(&self) -> Vec<StoredPaper> {
        self.papers
            .iter()
            .filter(|value| value.is_object())
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub search_name: String,
    pub file_path: String,
    pub paper_count: usize,
    pub updated_at: String,
}

pub struct ArchiveMerger {
    resolver: PathResolver,
    locks: Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>,
}

impl ArchiveMerger {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn resolve_dir(&self) -> Result<Utf8PathBuf, HarvestError> {
        self.resolver.resolve()
    }

    pub fn archive_path(&self, search_name: &str) -> Result<Utf8PathBuf, HarvestError> {
        if search_name.trim().is_empty() {
            return Err(HarvestError::InvalidInput("search name is empty".to_string()));
        }
        let dir = self.resolver.resolve()?;
        Ok(dir.join(archive_file_name(search_name)))
    }

    pub fn merge_and_save(
        &self,
        request: &MergeRequest,
        papers: Vec<Paper>,
    ) -> Result<MergeReport, HarvestError> {
        let incoming = papers
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| HarvestError::InvalidInput(err.to_string()))?;
        self.merge_values(request, incoming)
    }

    pub fn merge_json(&self, request: &MergeRequest, papers: Value) -> Result<MergeReport, HarvestError> {
        match papers {
            Value::Array(items) => self.merge_values(request, items),
            other => Err(HarvestError::InvalidInput(format!(
                "papers must be a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn merge_values(&self, request: &MergeRequest, incoming: Vec<Value>) -> Result<MergeReport, HarvestError> {
        let path = self.archive_path(&request.search_name)?;

        let lock = self.lock_for(&path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = read_existing_papers(&path)?;
        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(existing.len() + incoming.len());
        for record in existing {
            let Some(key) = value_key(&record) else {
                continue;
            };
            if seen.insert(key) {
                merged.push(record);
            }
        }

        let now = iso_timestamp();
        let mut new_count = 0usize;
        for record in incoming {
            let Value::Object(mut fields) = record else {
                if !record.is_null() {
                    tracing::warn!(kind = json_kind(&record), "skipping non-object paper");
                }
                continue;
            };
            let key = object_key(&fields);
            if !seen.insert(key) {
                continue;
            }
            fields.insert(RECORD_CREATED_AT.to_string(), Value::String(now.clone()));
            merged.push(Value::Object(fields));
            new_count += 1;
        }

        let file = ArchiveFile {
            search_name: request.search_name.clone(),
            search_type: request.search_type,
            query: request.query.clone(),
            max_results: request.max_results,
            updated_at: now,
            paper_count: merged.len(),
            papers: merged,
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|err| HarvestError::Persistence(err.to_string()))?;
        write_bytes_atomic(&path, &content)?;

        tracing::info!(
            archive = %path,
            new = new_count,
            total = file.paper_count,
            "archive merged"
        );
        Ok(MergeReport {
            file_path: path.to_string(),
            new_count,
            total_count: file.paper_count,
        })
    }

    pub fn load(&self, search_name: &str) -> Result<ArchiveFile, HarvestError> {
        let path = self.archive_path(search_name)?;
        if !path.as_std_path().exists() {
            return Err(HarvestError::ArchiveNotFound(search_name.to_string()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HarvestError::Persistence(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| HarvestError::Persistence(format!("parse {path}: {err}")))
    }

    pub fn list(&self) -> Result<Vec<ArchiveSummary>, HarvestError> {
        let dir = self.resolver.resolve()?;
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| HarvestError::Persistence(format!("read {dir}: {err}")))?;

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Persistence(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.extension() != Some("json") || !path.as_std_path().is_file() {
                continue;
            }
            match read_archive(&path) {
                Ok(file) => summaries.push(ArchiveSummary {
                    search_name: file.search_name,
                    file_path: path.to_string(),
                    paper_count: file.paper_count,
                    updated_at: file.updated_at,
                }),
                Err(err) => tracing::warn!(path = %path, error = %err, "skipping unreadable archive"),
            }
        }
        summaries.sort_by(|a, b| a.search_name.cmp(&b.search_name));
        Ok(summaries)
    }

    fn lock_for(&self, path: &Utf8Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

pub fn archive_file_name(search_name: &str) -> String {
    let sanitized = sanitize_file_name(search_name);
    if sanitized.is_empty() {
        format!("search-{}.json", chrono::Utc::now().format("%Y%m%d%H%M%S"))
    } else {
        format!("{sanitized}.json")
    }
}

fn read_archive(path: &Utf8Path) -> Result<ArchiveFile, HarvestError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| HarvestError::Persistence(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| HarvestError::Persistence(err.to_string()))
}

fn read_existing_papers(path: &Utf8Path) -> Result<Vec<Value>, HarvestError> {
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(HarvestError::Persistence(format!("read {path}: {err}"))),
    };

    let parsed: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(archive = %path, error = %err, "existing archive is not valid JSON, starting over");
            return Ok(Vec::new());
        }
    };
    match parsed.get("papers") {
        Some(Value::Array(papers)) => Ok(papers.clone()),
        Some(_) => {
            tracing::warn!(archive = %path, "existing archive has no paper list, starting over");
            Ok(Vec::new())
        }
        None => Ok(Vec::new()),
    }
}

fn value_key(value: &Value) -> Option<String> {
    value.as_object().map(object_key)
}

fn object_key(fields: &Map<String, Value>) -> String {
    let field = |name: &str| fields.get(name).map(scalar_text).unwrap_or_default();
    identity_key(&field("id"), &field("title"), &field("published"))
}

// Numbers and booleans stored by other tools still count as identifiers;
// falsy scalars read as missing.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) if number.as_f64() != Some(0.0) => number.to_string(),
        Value::Bool(true) => "true".to_string(),
        _ => String::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
