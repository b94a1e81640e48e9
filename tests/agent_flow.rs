//! 编排器端到端测试：脚本化 LLM 驱动完整回合，不依赖网络

use std::sync::Arc;
use std::time::Duration;

use mantis::config::{AgentSection, MemorySection};
use mantis::core::Orchestrator;
use mantis::llm::ScriptedLlmClient;
use mantis::memory::{ConversationSink, MemoryManager, TurnRecord};
use mantis::skills::SkillStore;
use mantis::tools::{CalcTool, DocReadTool, EchoTool, ToolExecutor, ToolRegistry};

/// 把记录转发给测试侧 channel 的落库端
struct ChannelSink(tokio::sync::mpsc::UnboundedSender<TurnRecord>);

#[async_trait::async_trait]
impl ConversationSink for ChannelSink {
    async fn append(&self, record: TurnRecord) -> Result<(), String> {
        self.0.send(record).map_err(|e| e.to_string())
    }
}

/// 每次调用都失败的落库端
struct FailingSink;

#[async_trait::async_trait]
impl ConversationSink for FailingSink {
    async fn append(&self, _record: TurnRecord) -> Result<(), String> {
        Err("sink down".to_string())
    }
}

fn executor() -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(CalcTool);
    registry.register(EchoTool);
    ToolExecutor::new(registry, 5)
}

fn agent_cfg() -> AgentSection {
    AgentSection {
        max_iterations: 6,
        max_plan_steps: 6,
    }
}

fn memory_cfg() -> MemorySection {
    MemorySection {
        max_messages: 20,
        summary_trigger: 30,
        summary_keep: 6,
    }
}

#[tokio::test]
async fn test_calculator_turn_end_to_end() {
    let llm = Arc::new(ScriptedLlmClient::new([
        // Planner
        "1. 解析算式\n2. 调用 calc 计算\n3. 给出结果",
        // ReAct：一次工具调用，观察到 14 后收尾
        r#"{"tool": "calc", "args": {"expression": "(3+4)*2"}}"#,
        "Final: 计算结果是 14",
        // Reflector：通过
        "Reflection: 结果准确\nFinal: 计算结果是 14",
    ]));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let skills_dir = tempfile::tempdir().unwrap();
    let memory = MemoryManager::new(llm.clone(), &memory_cfg())
        .with_sink(Arc::new(ChannelSink(tx)));
    let mut orchestrator = Orchestrator::new(
        llm.clone(),
        executor(),
        Arc::new(SkillStore::new(skills_dir.path())),
        memory,
        &agent_cfg(),
    );

    let answer = orchestrator.run("帮我计算 (3+4)*2", Some("sess-1")).await;
    assert!(answer.contains("14"));
    assert_eq!(orchestrator.memory().detailed_len(), 2);
    assert_eq!(llm.remaining(), 0);

    // 落库是 fire-and-forget，经 channel 等待送达
    let record = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("sink record not dispatched")
        .expect("sink channel closed");
    assert_eq!(record.user_input, "帮我计算 (3+4)*2");
    assert!(record.assistant_output.contains("14"));
    assert_eq!(record.session_id.as_deref(), Some("sess-1"));
    assert!(!record.plan.is_empty());
}

#[tokio::test]
async fn test_failing_sink_does_not_break_turn() {
    let llm = Arc::new(ScriptedLlmClient::new([
        "1. 直接回答",
        "Final: 好的",
        // 反思输出不合格式：视为通过
        "看起来没问题。",
    ]));

    let skills_dir = tempfile::tempdir().unwrap();
    let memory =
        MemoryManager::new(llm.clone(), &memory_cfg()).with_sink(Arc::new(FailingSink));
    let mut orchestrator = Orchestrator::new(
        llm,
        executor(),
        Arc::new(SkillStore::new(skills_dir.path())),
        memory,
        &agent_cfg(),
    );

    let answer = orchestrator.run("随便聊聊", None).await;
    assert_eq!(answer, "好的");
    assert_eq!(orchestrator.memory().detailed_len(), 2);
}

#[tokio::test]
async fn test_unmatched_command_routes_to_normal_flow() {
    // /nosuch 不是已知技能：按普通对话处理，不报错
    let llm = Arc::new(ScriptedLlmClient::new([
        "1. 回答",
        "Final: 我不认识这个命令，但可以直接帮你。",
        "Reflection: ok\nFinal: 我不认识这个命令，但可以直接帮你。",
    ]));

    let skills_dir = tempfile::tempdir().unwrap();
    let memory = MemoryManager::new(llm.clone(), &memory_cfg());
    let mut orchestrator = Orchestrator::new(
        llm,
        executor(),
        Arc::new(SkillStore::new(skills_dir.path())),
        memory,
        &agent_cfg(),
    );

    let answer = orchestrator.run("/nosuch do something", None).await;
    assert!(answer.contains("直接帮你"));
    assert_eq!(orchestrator.memory().detailed_len(), 2);
}

#[tokio::test]
async fn test_skill_turn_materializes_once_and_restricts_tools() {
    let skills_dir = tempfile::tempdir().unwrap();
    let review = skills_dir.path().join("review");
    std::fs::create_dir_all(&review).unwrap();
    std::fs::write(
        review.join("SKILL.md"),
        "---\n\
name: review\n\
description: 审查文档\n\
allowed-tools: read_doc\n\
---\n\
请审查 $ARGUMENTS 并输出问题列表。",
    )
    .unwrap();

    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("a.md"), "第一条 甲方应……").unwrap();

    let mut registry = ToolRegistry::new();
    registry.register(CalcTool);
    registry.register(DocReadTool::new(workspace.path()));
    let executor = ToolExecutor::new(registry, 5);

    let llm = Arc::new(ScriptedLlmClient::new([
        // 第一回合
        "1. 读取文档\n2. 输出问题列表",
        r#"{"tool": "read_doc", "args": {"path": "a.md"}}"#,
        "Final: 审查完成：未发现高危问题。",
        "Reflection: ok\nFinal: 审查完成：未发现高危问题。",
        // 第二回合（复用已物化技能）
        "1. 读取文档",
        "Final: 第二次审查完成。",
        "Reflection: ok\nFinal: 第二次审查完成。",
    ]));

    let skills = Arc::new(SkillStore::new(skills_dir.path()));
    assert_eq!(skills.discover().await, 1);
    assert_eq!(skills.loaded_count().await, 0);

    let memory = MemoryManager::new(llm.clone(), &memory_cfg());
    let mut orchestrator =
        Orchestrator::new(llm, executor, skills.clone(), memory, &agent_cfg());

    let answer = orchestrator.run("/review a.md 重点看付款条款", Some("s-7")).await;
    assert!(answer.contains("审查完成"));
    assert_eq!(skills.loaded_count().await, 1);

    let answer = orchestrator.run("/review b.md", Some("s-7")).await;
    assert!(answer.contains("第二次"));
    // 重复调用复用缓存实例，不重复解析
    assert_eq!(skills.loaded_count().await, 1);
}

#[tokio::test]
async fn test_broken_skill_yields_visible_message_and_conversation_continues() {
    let skills_dir = tempfile::tempdir().unwrap();
    let broken = skills_dir.path().join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    // 头块没有闭合围栏
    std::fs::write(broken.join("SKILL.md"), "---\ndescription: 坏头\n正文").unwrap();

    let llm = Arc::new(ScriptedLlmClient::new([
        "1. 回答",
        "Final: 正常对话继续。",
        "Reflection: ok\nFinal: 正常对话继续。",
    ]));

    let skills = Arc::new(SkillStore::new(skills_dir.path()));
    skills.discover().await;

    let memory = MemoryManager::new(llm.clone(), &memory_cfg());
    let mut orchestrator =
        Orchestrator::new(llm, executor(), skills, memory, &agent_cfg());

    let answer = orchestrator.run("/broken do it", None).await;
    assert!(answer.contains("broken"));
    assert!(answer.contains("技能解析失败"));
    // 失败的技能回合不写记忆
    assert_eq!(orchestrator.memory().detailed_len(), 0);

    // 会话可以继续正常模式
    let answer = orchestrator.run("继续聊", None).await;
    assert_eq!(answer, "正常对话继续。");
    assert_eq!(orchestrator.memory().detailed_len(), 2);
}
