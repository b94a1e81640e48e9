//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，如 `MANTIS__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub skills: SkillsSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

/// [app] 段：应用名与文档工具的沙箱根目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择（OpenAI 兼容端点）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    /// 自定义端点（DeepSeek、代理等），未设置时用官方 API
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [agent] 段：ReAct 步数与计划长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单回合内最大 ReAct 步数，超出时以最后草稿强制收尾
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 计划最多包含的步骤数
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_plan_steps: default_max_plan_steps(),
        }
    }
}

fn default_max_iterations() -> usize {
    6
}

fn default_max_plan_steps() -> usize {
    6
}

/// [memory] 段：上下文窗口与摘要折叠阈值
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// get_context 返回的最近明细消息条数
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// 明细消息超过此值时触发摘要折叠
    #[serde(default = "default_summary_trigger")]
    pub summary_trigger: usize,
    /// 折叠后保留的明细消息条数
    #[serde(default = "default_summary_keep")]
    pub summary_keep: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            summary_trigger: default_summary_trigger(),
            summary_keep: default_summary_keep(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_summary_trigger() -> usize {
    30
}

fn default_summary_keep() -> usize {
    6
}

/// [skills] 段：技能目录
#[derive(Debug, Clone, Deserialize)]
pub struct SkillsSection {
    #[serde(default = "default_skills_dir")]
    pub dir: PathBuf,
}

impl Default for SkillsSection {
    fn default() -> Self {
        Self {
            dir: default_skills_dir(),
        }
    }
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [persistence] 段：对话落库（JSONL 文件）
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_persistence_path")]
    pub path: PathBuf,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_persistence_path(),
        }
    }
}

fn default_persistence_path() -> PathBuf {
    PathBuf::from("memory/conversations.jsonl")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            agent: AgentSection::default(),
            memory: MemorySection::default(),
            skills: SkillsSection::default(),
            tools: ToolsSection::default(),
            persistence: PersistenceSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
