//! 文档读取工具
//!
//! 在沙箱根目录下读取纯文本 / Markdown 文档，路径经校验必须在根下（禁止 ../ 逃逸），
//! 可选 max_chars 截断，超出部分以 [TRUNCATED] 标记。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 沙箱文档读取：绑定根目录，resolve 校验路径在根下
pub struct DocReadTool {
    root_dir: PathBuf,
}

impl DocReadTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| format!("file not found: {}", path))?;
        let root_canon = self
            .root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone());
        if canonical.starts_with(root_canon) {
            Ok(canonical)
        } else {
            Err(format!("path escapes workspace: {}", path))
        }
    }
}

#[async_trait]
impl Tool for DocReadTool {
    fn name(&self) -> &str {
        "read_doc"
    }

    fn description(&self) -> &str {
        "Read a plain-text or markdown document from the workspace. \
         Args: {\"path\": \"relative path\", \"max_chars\": 4000}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "file path relative to workspace" },
                "max_chars": { "type": "integer", "description": "truncate output to at most this many chars" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args
            .get("path")
            .or_else(|| args.get("file_path"))
            .or_else(|| args.get("input"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing 'path'".to_string())?;
        let max_chars = args.get("max_chars").and_then(|v| v.as_u64());

        let resolved = self.resolve(path)?;
        tracing::info!(path = %path, "read_doc tool execute");
        let text =
            std::fs::read_to_string(&resolved).map_err(|e| format!("read failed: {}", e))?;
        Ok(truncate(&text, max_chars))
    }
}

fn truncate(text: &str, max_chars: Option<u64>) -> String {
    let Some(max) = max_chars.filter(|m| *m > 0) else {
        return text.to_string();
    };
    let max = max as usize;
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max).collect();
    format!("{}\n\n[TRUNCATED]", head)
}
