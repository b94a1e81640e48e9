//! 技能仓库：懒加载两段式生命周期
//!
//! 启动时只扫描一层目录、读取 SKILL.md 的头块（--- 围栏内），记录 stub
//! （名称 + 描述），正文在首次 /命令 调用时才物化并缓存（单向、幂等）。
//! stub 永远不会被当作已物化技能使用：循环只会拿到物化后的正文。

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::skills::skill::{parse_header, Skill};

/// 支持文件所在的约定子目录
const SUPPORT_SUBDIRS: [&str; 4] = ["scripts", "templates", "resources", "references"];

/// 技能解析失败：对用户可见，不会让编排器崩溃
#[derive(Error, Debug)]
pub enum SkillError {
    #[error("skill '{0}' not found")]
    NotFound(String),

    #[error("skill '{name}' definition missing: {path}")]
    MissingDefinition { name: String, path: PathBuf },

    #[error("skill '{name}' header malformed: {reason}")]
    MalformedHeader { name: String, reason: String },

    #[error("failed to read skill '{name}': {reason}")]
    Io { name: String, reason: String },
}

/// 仅含名称与描述的占位条目，startup 扫描产物
#[derive(Debug, Clone)]
pub struct SkillStub {
    pub name: String,
    pub description: String,
    pub dir: PathBuf,
}

/// 两段式条目：stub -> loaded，单向
enum SkillEntry {
    Stub(SkillStub),
    Loaded(Arc<Skill>),
}

/// 技能仓库：按规范名索引，物化缓存只增不减
pub struct SkillStore {
    skills_dir: PathBuf,
    entries: RwLock<HashMap<String, SkillEntry>>,
}

impl SkillStore {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 启动扫描：一层目录深度，每个含 SKILL.md 的子目录记为 stub。
    /// 只读头块，不读正文；头块坏掉的目录仍记 stub（描述为空），
    /// 让问题在用户调用时以明确错误暴露。返回发现的 stub 数。
    pub async fn discover(&self) -> usize {
        let mut found = 0;
        let Ok(read_dir) = std::fs::read_dir(&self.skills_dir) else {
            tracing::debug!(dir = %self.skills_dir.display(), "skills dir absent, no skills loaded");
            return 0;
        };

        let mut entries = self.entries.write().await;
        for entry in read_dir.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if dir_name.starts_with('.') {
                continue;
            }
            let definition = dir.join("SKILL.md");
            if !definition.is_file() {
                continue;
            }

            let name = normalize_name(&dir_name);
            let description = match read_header_lines(&definition) {
                Ok(lines) => parse_header(&lines).description,
                Err(reason) => {
                    tracing::warn!(skill = %name, "skill header unreadable at discovery: {}", reason);
                    String::new()
                }
            };

            entries.insert(
                name.clone(),
                SkillEntry::Stub(SkillStub {
                    name,
                    description,
                    dir,
                }),
            );
            found += 1;
        }

        tracing::info!("Discovered {} skill stubs", found);
        found
    }

    /// 匹配 /name [arguments] 形式的命令（名称大小写不敏感）。
    /// 返回 (规范名, 参数串)；非命令或名称未知时返回 None，调用方走普通对话流程。
    pub async fn match_command(&self, input: &str) -> Option<(String, String)> {
        let rest = input.trim().strip_prefix('/')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let token = parts.next()?.trim();
        if token.is_empty() {
            return None;
        }
        let args = parts.next().unwrap_or("").trim().to_string();

        let key = normalize_name(token);
        let entries = self.entries.read().await;
        entries.contains_key(&key).then_some((key, args))
    }

    /// 物化技能：已加载则直接返回缓存实例（幂等），否则解析完整定义并缓存
    pub async fn materialize(&self, name: &str) -> Result<Arc<Skill>, SkillError> {
        let mut entries = self.entries.write().await;
        let dir = match entries.get(name) {
            None => return Err(SkillError::NotFound(name.to_string())),
            Some(SkillEntry::Loaded(skill)) => return Ok(Arc::clone(skill)),
            Some(SkillEntry::Stub(stub)) => stub.dir.clone(),
        };

        let skill = Arc::new(load_skill(name, &dir)?);
        entries.insert(name.to_string(), SkillEntry::Loaded(Arc::clone(&skill)));
        tracing::info!(skill = %name, "skill materialized");
        Ok(skill)
    }

    /// 命令匹配 + 物化的组合入口：None 表示路由到普通对话流程
    pub async fn resolve(
        &self,
        input: &str,
    ) -> Option<Result<(Arc<Skill>, String), SkillError>> {
        let (name, args) = self.match_command(input).await?;
        Some(self.materialize(&name).await.map(|skill| (skill, args)))
    }

    /// 已物化条目数（测试与诊断用）
    pub async fn loaded_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| matches!(e, SkillEntry::Loaded(_)))
            .count()
    }

    /// 全部 /命令 摘要（按名排序），供 REPL 展示
    pub async fn summaries(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut lines: Vec<String> = entries
            .values()
            .map(|e| {
                let (name, description) = match e {
                    SkillEntry::Stub(s) => (&s.name, &s.description),
                    SkillEntry::Loaded(s) => (&s.name, &s.description),
                };
                format!("/{}: {}", name, description)
            })
            .collect();
        lines.sort();
        lines
    }
}

/// 规范化技能名：小写，空格/下划线连字符化
fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '_'], "-")
}

/// 只读头块：首个非空行必须是 ---，收集到下一个 --- 为止；正文不读
fn read_header_lines(path: &Path) -> Result<Vec<String>, String> {
    let file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let reader = std::io::BufReader::new(file);

    let mut header = Vec::new();
    let mut opened = false;
    for line in reader.lines() {
        let line = line.map_err(|e| e.to_string())?;
        let trimmed = line.trim();
        if !opened {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "---" {
                opened = true;
                continue;
            }
            return Err("missing front-matter fence".to_string());
        }
        if trimmed == "---" {
            return Ok(header);
        }
        header.push(line);
    }
    Err("unterminated front-matter fence".to_string())
}

/// 解析完整定义：头 + 正文 + 支持文件
fn load_skill(name: &str, dir: &Path) -> Result<Skill, SkillError> {
    let definition = dir.join("SKILL.md");
    if !definition.is_file() {
        return Err(SkillError::MissingDefinition {
            name: name.to_string(),
            path: definition,
        });
    }

    let raw = std::fs::read_to_string(&definition).map_err(|e| SkillError::Io {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let (header_lines, body) =
        split_front_matter(&raw).map_err(|reason| SkillError::MalformedHeader {
            name: name.to_string(),
            reason,
        })?;
    let header = parse_header(&header_lines);
    if let Some(ref declared) = header.name {
        if normalize_name(declared) != name {
            tracing::debug!(
                skill = %name,
                declared = %declared,
                "header name differs from directory-derived name, directory wins"
            );
        }
    }

    Ok(Skill {
        name: name.to_string(),
        description: header.description,
        argument_hint: header.argument_hint,
        allowed_tools: header.allowed_tools,
        body: body.trim().to_string(),
        support_files: discover_support_files(dir),
        dir: dir.to_path_buf(),
    })
}

fn split_front_matter(raw: &str) -> Result<(Vec<String>, String), String> {
    let lines: Vec<&str> = raw.lines().collect();

    let mut i = 0;
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }
    if i >= lines.len() {
        return Err("empty definition file".to_string());
    }
    if lines[i].trim() != "---" {
        return Err("missing front-matter fence".to_string());
    }
    i += 1;

    let header_start = i;
    while i < lines.len() {
        if lines[i].trim() == "---" {
            let header = lines[header_start..i].iter().map(|s| s.to_string()).collect();
            let body = lines[i + 1..].join("\n");
            return Ok((header, body));
        }
        i += 1;
    }
    Err("unterminated front-matter fence".to_string())
}

/// 支持文件：约定子目录下一层的文件 + 根目录除 SKILL.md 外的文件（相对路径）
fn discover_support_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for subdir in SUPPORT_SUBDIRS {
        let sub = dir.join(subdir);
        let Ok(read_dir) = std::fs::read_dir(&sub) else {
            continue;
        };
        for entry in read_dir.flatten() {
            if entry.path().is_file() {
                files.push(PathBuf::from(subdir).join(entry.file_name()));
            }
        }
    }

    if let Ok(read_dir) = std::fs::read_dir(dir) {
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_file() && entry.file_name() != "SKILL.md" {
                files.push(PathBuf::from(entry.file_name()));
            }
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, dir_name: &str, content: &str) {
        let dir = root.join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("SKILL.md"), content).unwrap();
    }

    const REVIEW_SKILL: &str = "---\n\
name: review\n\
description: 审查文档并输出问题列表\n\
argument-hint: [file] [notes]\n\
allowed-tools: read_doc\n\
---\n\
请审查 $ARGUMENTS 并输出问题列表。";

    #[tokio::test]
    async fn test_discover_records_stubs_without_materializing() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "Review", REVIEW_SKILL);
        write_skill(
            tmp.path(),
            "fix_issue",
            "---\ndescription: 修复问题\n---\n正文",
        );

        let store = SkillStore::new(tmp.path());
        assert_eq!(store.discover().await, 2);
        assert_eq!(store.loaded_count().await, 0);

        let summaries = store.summaries().await;
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().any(|s| s.starts_with("/review:")));
        // 目录名连字符化
        assert!(summaries.iter().any(|s| s.starts_with("/fix-issue:")));
    }

    #[tokio::test]
    async fn test_match_command_routing() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "review", REVIEW_SKILL);
        let store = SkillStore::new(tmp.path());
        store.discover().await;

        // 大小写不敏感 + 参数余串
        let (name, args) = store
            .match_command("/Review contracts/a.docx extra")
            .await
            .unwrap();
        assert_eq!(name, "review");
        assert_eq!(args, "contracts/a.docx extra");

        // 非命令与未知命令都走普通流程
        assert!(store.match_command("帮我算一下").await.is_none());
        assert!(store.match_command("/unknown args").await.is_none());

        // 匹配本身不触发物化
        assert_eq!(store.loaded_count().await, 0);
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "review", REVIEW_SKILL);
        let store = SkillStore::new(tmp.path());
        store.discover().await;

        let first = store.materialize("review").await.unwrap();
        assert_eq!(store.loaded_count().await, 1);
        assert_eq!(first.allowed_tools, vec!["read_doc"]);

        let second = store.materialize("review").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.loaded_count().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_renders_arguments_literally() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "review", REVIEW_SKILL);
        let store = SkillStore::new(tmp.path());
        store.discover().await;

        let (skill, args) = store
            .resolve("/review contracts/a.docx extra")
            .await
            .unwrap()
            .unwrap();
        let rendered = skill.render(&args, None);
        assert_eq!(rendered, "请审查 contracts/a.docx extra 并输出问题列表。");
    }

    #[tokio::test]
    async fn test_malformed_header_surfaces_on_materialize() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "broken", "---\ndescription: 头没有关闭\n正文在这");
        let store = SkillStore::new(tmp.path());
        store.discover().await;

        let err = store.materialize("broken").await.unwrap_err();
        assert!(matches!(err, SkillError::MalformedHeader { .. }));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_definition_surfaces_on_materialize() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "ghost", REVIEW_SKILL);
        let store = SkillStore::new(tmp.path());
        store.discover().await;

        std::fs::remove_file(tmp.path().join("ghost").join("SKILL.md")).unwrap();
        let err = store.materialize("ghost").await.unwrap_err();
        assert!(matches!(err, SkillError::MissingDefinition { .. }));
    }

    #[tokio::test]
    async fn test_support_file_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "review", REVIEW_SKILL);
        let dir = tmp.path().join("review");
        std::fs::create_dir(dir.join("templates")).unwrap();
        std::fs::write(dir.join("templates").join("report.md"), "模板").unwrap();
        std::fs::write(dir.join("checklist.md"), "清单").unwrap();

        let store = SkillStore::new(tmp.path());
        store.discover().await;
        let skill = store.materialize("review").await.unwrap();

        assert_eq!(
            skill.support_files,
            vec![PathBuf::from("checklist.md"), PathBuf::from("templates/report.md")]
        );
    }
}
