//! Filesystem tools: `list_files` and `read_file`.
//!
//! Paths may start with `~`. Hidden entries (dot-prefixed) are skipped.

use std::path::PathBuf;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agent_core::Tool;
use crate::inference::config::expand_tilde;
use crate::inference::provider::truncate_utf8;

/// Files larger than this are refused by `read_file`.
const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Default number of characters returned by `read_file`.
const DEFAULT_READ_CHARS: usize = 8000;

/// A single file/directory entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub entry_type: String,
    pub size: u64,
    pub modified: String,
}

fn resolve(args: &Value) -> anyhow::Result<PathBuf> {
    let raw = args
        .get("path")
        .and_then(Value::as_str)
        .context("path must be a string")?;
    Ok(PathBuf::from(expand_tilde(raw.trim())))
}

/// List directory contents, directories first, then files, both alphabetically.
pub async fn list_directory(path: &std::path::Path) -> anyhow::Result<Vec<FileEntry>> {
    if !path.is_dir() {
        bail!("not a directory: {}", path.display());
    }

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("failed to read directory {}", path.display()))?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().await?;
        let entry_type = if metadata.is_dir() {
            "dir"
        } else if metadata.file_type().is_symlink() {
            "symlink"
        } else {
            "file"
        };
        let modified = metadata
            .modified()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        entries.push(FileEntry {
            name,
            entry_type: entry_type.to_string(),
            size: metadata.len(),
            modified,
        });
    }

    entries.sort_by(|a, b| {
        let a_is_dir = a.entry_type == "dir";
        let b_is_dir = b.entry_type == "dir";
        b_is_dir
            .cmp(&a_is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(entries)
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the files and folders in a directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path, ~ allowed"}
            },
            "required": ["path"]
        })
    }

    fn groups(&self) -> Vec<String> {
        vec!["files".into()]
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let path = resolve(&args)?;
        let entries = list_directory(&path).await?;
        tracing::debug!(path = %path.display(), count = entries.len(), "listed directory");
        Ok(serde_json::to_value(entries)?)
    }
}

pub struct ReadFileTool {
    default_chars: usize,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self {
            default_chars: DEFAULT_READ_CHARS,
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path, ~ allowed"},
                "max_chars": {"type": "integer", "description": "Maximum characters to return"}
            },
            "required": ["path"]
        })
    }

    fn groups(&self) -> Vec<String> {
        vec!["files".into()]
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let path = resolve(&args)?;
        let max_chars = args
            .get("max_chars")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.default_chars);

        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("file not found: {}", path.display()))?;
        if metadata.is_dir() {
            bail!("{} is a directory, use list_files", path.display());
        }
        if metadata.len() > MAX_READ_BYTES {
            bail!(
                "{} is too large ({} bytes, limit {MAX_READ_BYTES})",
                path.display(),
                metadata.len()
            );
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("{} is not a UTF-8 text file", path.display()))?;
        Ok(Value::String(truncate_utf8(&content, max_chars).to_string()))
    }
}
