//! 对话落库
//!
//! 每回合向 ConversationSink 追加一条 TurnRecord；落库失败只记日志，
//! 不影响回合结果。字段名固定，兼容外部存储后端。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 持久化的回合记录（session_id 可缺省）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user_input: String,
    pub assistant_output: String,
    pub plan: String,
    pub reflection: String,
    pub created_at: DateTime<Utc>,
}

/// 落库端：append 一条记录；实现方自行决定存储介质
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn append(&self, record: TurnRecord) -> Result<(), String>;
}

/// 单文件 JSONL 落库：每条记录一行 JSON，父目录不存在时自动创建
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ConversationSink for JsonlSink {
    async fn append(&self, record: TurnRecord) -> Result<(), String> {
        let line = serde_json::to_string(&record).map_err(|e| e.to_string())?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| e.to_string())?;
            writeln!(file, "{}", line).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conv.jsonl");
        let sink = JsonlSink::new(&path);

        for i in 0..2 {
            sink.append(TurnRecord {
                session_id: Some("s1".to_string()),
                user_input: format!("q{}", i),
                assistant_output: format!("a{}", i),
                plan: "1. answer".to_string(),
                reflection: String::new(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: TurnRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.user_input, "q0");
        assert_eq!(first.session_id.as_deref(), Some("s1"));
    }
}
