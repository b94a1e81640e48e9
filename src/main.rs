//! Mantis - Rust 对话智能体核心
//!
//! 入口：初始化日志、加载配置、装配组件（LLM / 工具 / 技能 / 记忆 / 编排器），
//! 然后进入行式 REPL 主循环。

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mantis::config::{load_config, AppConfig};
use mantis::core::Orchestrator;
use mantis::llm::{LlmClient, MockLlmClient, OpenAiClient};
use mantis::memory::{JsonlSink, MemoryManager};
use mantis::react::AgentEvent;
use mantis::skills::SkillStore;
use mantis::tools::{CalcTool, DocReadTool, EchoTool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        Err(_) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

const HELP_TEXT: &str = "命令：
  help / ?     显示本帮助
  skills       列出可用技能（/名称 [参数] 调用）
  quit / exit  退出
其余输入直接交给智能体处理。";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    // 工作目录：配置 > 当前目录下的 workspace
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap().join("workspace"));
    std::fs::create_dir_all(&workspace).ok();

    let llm = create_llm_from_config(&cfg);

    let mut tools = ToolRegistry::new();
    tools.register(CalcTool);
    tools.register(DocReadTool::new(&workspace));
    tools.register(EchoTool);
    let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);

    let skills = Arc::new(SkillStore::new(&cfg.skills.dir));
    skills.discover().await;

    let mut memory = MemoryManager::new(llm.clone(), &cfg.memory);
    if cfg.persistence.enabled {
        memory = memory.with_sink(Arc::new(JsonlSink::new(&cfg.persistence.path)));
    }

    // 过程事件：REPL 只展示工具调用日志，最终回答由 run 的返回值统一打印
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                AgentEvent::ToolCall { tool, args } => println!("[tool] {} {}", tool, args),
                AgentEvent::Observation { tool, preview } => {
                    println!("[tool] {} -> {}", tool, preview)
                }
                AgentEvent::ToolFailure { tool, reason } => {
                    println!("[tool] {} failed: {}", tool, reason)
                }
                _ => {}
            }
        }
    });

    let mut orchestrator =
        Orchestrator::new(llm, executor, skills.clone(), memory, &cfg.agent).with_events(event_tx);
    let session_id = uuid::Uuid::new_v4().to_string();

    let name = cfg.app.name.as_deref().unwrap_or("Mantis");
    println!("{} 对话智能体（会话 {}）", name, &session_id[..8]);
    println!("输入 help 查看命令，quit 退出。\n");

    let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        line.clear();
        let n = tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line)
            .await
            .context("stdin read failed")?;
        if n == 0 {
            break; // EOF (Ctrl+D)
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "quit" | "exit" | "q" => break,
            "help" | "?" => {
                println!("{}", HELP_TEXT);
                continue;
            }
            "skills" => {
                let summaries = skills.summaries().await;
                if summaries.is_empty() {
                    println!("（没有发现技能目录）");
                }
                for s in summaries {
                    println!("{}", s);
                }
                continue;
            }
            _ => {}
        }

        let answer = orchestrator.run(input, Some(&session_id)).await;
        println!("\nAssistant: {}\n", answer);
    }

    println!("再见！");
    Ok(())
}
