//! File operation tools: read_file, write_file, list_dir

use super::registry::{Tool, require_str};
use async_trait::async_trait;
use overmind_domain::ToolError;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::path::Path;

/// Tool name constants
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIR: &str = "list_dir";

/// Maximum file size to read (10 MB)
const MAX_READ_SIZE: u64 = 10 * 1024 * 1024;

fn io_error(path: &str, e: &std::io::Error) -> ToolError {
    match e.kind() {
        ErrorKind::NotFound => ToolError::not_found(path),
        ErrorKind::PermissionDenied => {
            ToolError::execution_failed(format!("Permission denied: {}", path))
        }
        _ => ToolError::execution_failed(format!("{}: {}", path, e)),
    }
}

/// Reads a UTF-8 file. Result: `{path, content, bytes}`.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the specified path"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(path, &e))?;
        if !metadata.is_file() {
            return Err(ToolError::invalid_argument(format!(
                "'{}' is not a file",
                path
            )));
        }
        if metadata.len() > MAX_READ_SIZE {
            return Err(ToolError::invalid_argument(format!(
                "File too large ({} bytes). Maximum size is {} bytes",
                metadata.len(),
                MAX_READ_SIZE
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, &e))?;
        Ok(json!({
            "path": path,
            "bytes": content.len(),
            "content": content,
        }))
    }
}

/// Writes `content` to `path`, creating parent directories when
/// `create_dirs` is true. Result: `{path, bytes}`.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it if it exists"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let content = require_str(args, "content")?;
        let create_dirs = args
            .get("create_dirs")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            if create_dirs {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(path, &e))?;
            } else if !parent.exists() {
                return Err(ToolError::not_found(format!(
                    "parent directory of {}",
                    path
                )));
            }
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| io_error(path, &e))?;
        Ok(json!({ "path": path, "bytes": content.len() }))
    }
}

/// Lists a directory, sorted by name. Result: `{path, entries: [{name, is_dir}]}`.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        LIST_DIR
    }

    fn description(&self) -> &str {
        "List the entries of a directory"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| io_error(path, &e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(path, &e))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({ "name": name, "is_dir": is_dir }))
            .collect();
        Ok(json!({ "path": path, "entries": entries }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_file_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let result = ReadFileTool
            .call(&json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(result["content"], "hello");
        assert_eq!(result["bytes"], 5);
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let err = ReadFileTool
            .call(&json!({"path": "/nonexistent/file.txt"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ToolError::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_file_requires_path() {
        let err = ReadFileTool.call(&json!({})).await.unwrap_err();
        assert_eq!(err.code, ToolError::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn test_write_file_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.txt");
        let path_str = path.to_str().unwrap();

        let err = WriteFileTool
            .call(&json!({"path": path_str, "content": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ToolError::NOT_FOUND);

        WriteFileTool
            .call(&json!({"path": path_str, "content": "x", "create_dirs": true}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        let result = ListDirTool
            .call(&json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(
            result["entries"],
            json!([{"name": "a", "is_dir": true}, {"name": "b.txt", "is_dir": false}])
        );
    }
}
