//! file：读 / 写 / 追加
//!
//! 配置了 files_root 时，所有路径必须落在该目录下（相对路径以其为基准，禁止 ../ 与符号链接逃逸）；
//! 未配置时只展开 `~/`。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::actions::{Action, ActionHandler, ActionKind, FileOp, FileParams};

/// 读文件时返回的最大字符数
const MAX_READ_CHARS: usize = 64 * 1024;

pub struct FileHandler {
    root: Option<PathBuf>,
}

impl FileHandler {
    pub fn new(root: Option<PathBuf>) -> Self {
        let root = root.map(|r| {
            let r = expand_home(&r);
            r.canonicalize().unwrap_or(r)
        });
        Self { root }
    }

    /// 解析目标路径；写操作允许文件不存在，但父目录必须存在
    fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
        let path = expand_home(Path::new(raw.trim()));
        let Some(root) = &self.root else {
            return Ok(path);
        };

        let joined = if path.is_absolute() {
            path
        } else {
            root.join(path)
        };
        if joined.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("path escapes files root: {}", raw));
        }

        let resolved = match joined.canonicalize() {
            Ok(p) => p,
            Err(_) => {
                let parent = joined
                    .parent()
                    .ok_or_else(|| format!("invalid path: {}", raw))?;
                let name = joined
                    .file_name()
                    .ok_or_else(|| format!("invalid path: {}", raw))?;
                parent
                    .canonicalize()
                    .map_err(|e| format!("{}: {}", parent.display(), e))?
                    .join(name)
            }
        };
        if resolved.starts_with(root) {
            Ok(resolved)
        } else {
            Err(format!("path escapes files root: {}", raw))
        }
    }

    async fn run(&self, params: &FileParams) -> Result<Value, String> {
        let path = self.resolve(&params.path)?;
        let shown = path.display().to_string();
        match params.operation {
            FileOp::Read => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| format!("read {}: {}", shown, e))?;
                let truncated = content.chars().count() > MAX_READ_CHARS;
                let content: String = content.chars().take(MAX_READ_CHARS).collect();
                Ok(json!({"path": shown, "content": content, "truncated": truncated}))
            }
            FileOp::Write => {
                let content = params.content.as_deref().unwrap_or_default();
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| format!("write {}: {}", shown, e))?;
                Ok(json!({"path": shown, "bytes": content.len()}))
            }
            FileOp::Append => {
                let content = params.content.as_deref().unwrap_or_default();
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(|e| format!("open {}: {}", shown, e))?;
                file.write_all(content.as_bytes())
                    .await
                    .map_err(|e| format!("append {}: {}", shown, e))?;
                file.flush().await.map_err(|e| format!("append {}: {}", shown, e))?;
                Ok(json!({"path": shown, "bytes": content.len()}))
            }
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[async_trait]
impl ActionHandler for FileHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[ActionKind::File]
    }

    fn description(&self) -> &str {
        "Read, write or append a file"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        let Action::File(params) = action else {
            return Err(format!("file handler cannot run `{}`", action.kind()));
        };
        tracing::info!(operation = ?params.operation, path = %params.path, "file action");
        self.run(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(operation: FileOp, path: &str, content: Option<&str>) -> Action {
        Action::File(FileParams {
            operation,
            path: path.into(),
            content: content.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_write_append_read_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(Some(dir.path().to_path_buf()));

        handler
            .execute(&file(FileOp::Write, "notes.txt", Some("one\n")))
            .await
            .unwrap();
        handler
            .execute(&file(FileOp::Append, "notes.txt", Some("two\n")))
            .await
            .unwrap();
        let out = handler
            .execute(&file(FileOp::Read, "notes.txt", None))
            .await
            .unwrap();
        assert_eq!(out["content"], "one\ntwo\n");
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn test_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(Some(dir.path().to_path_buf()));

        let err = handler
            .execute(&file(FileOp::Read, "../etc/passwd", None))
            .await
            .unwrap_err();
        assert!(err.contains("escapes files root"));

        let err = handler
            .execute(&file(FileOp::Write, "/tmp/outside-hyprai.txt", Some("x")))
            .await
            .unwrap_err();
        assert!(err.contains("escapes files root"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(Some(dir.path().to_path_buf()));
        let err = handler
            .execute(&file(FileOp::Read, "absent.txt", None))
            .await
            .unwrap_err();
        assert!(err.starts_with("read "));
    }

    #[tokio::test]
    async fn test_unconfined_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("free.txt");
        let handler = FileHandler::new(None);
        handler
            .execute(&file(FileOp::Write, path.to_str().unwrap(), Some("hi")))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi");
    }
}
