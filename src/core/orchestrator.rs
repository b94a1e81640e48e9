//! 回合编排器
//!
//! 每回合严格顺序执行：技能解析 -> 读上下文 -> Planner -> ReAct 循环 ->
//! Reflector -> 写记忆，各步产物只在回合内存活（除随记录落库的部分）。
//! 匹配到技能时，渲染后的正文作为权威任务指令注入，工具集收窄到
//! 技能声明的 allowed-tools。任何上游失败都降级为可用的回答，不会中断进程。

use std::sync::Arc;

use crate::config::AgentSection;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::MemoryManager;
use crate::react::{
    events::send_event, react_loop, AgentEvent, EventSender, Planner, ReactSession, Reflector,
};
use crate::skills::SkillStore;
use crate::tools::ToolExecutor;

/// 编排器：每会话一个实例，持有该会话的记忆与组件
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    reflector: Reflector,
    executor: ToolExecutor,
    skills: Arc<SkillStore>,
    memory: MemoryManager,
    max_iterations: usize,
    events: Option<EventSender>,
    cancel_token: tokio_util::sync::CancellationToken,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        skills: Arc<SkillStore>,
        memory: MemoryManager,
        agent_cfg: &AgentSection,
    ) -> Self {
        Self {
            planner: Planner::new(llm.clone(), agent_cfg.max_plan_steps),
            reflector: Reflector::new(llm.clone()),
            llm,
            executor,
            skills,
            memory,
            max_iterations: agent_cfg.max_iterations,
            events: None,
            cancel_token: tokio_util::sync::CancellationToken::new(),
        }
    }

    /// 设置过程事件推送（可选，仅展示用）
    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// 取消句柄：外部可据此中断当前回合的 ReAct 循环
    pub fn cancel_token(&self) -> tokio_util::sync::CancellationToken {
        self.cancel_token.clone()
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// 处理一条用户输入，返回最终回答
    pub async fn run(&mut self, user_input: &str, session_id: Option<&str>) -> String {
        // 1. 技能命令：匹配则渲染正文并收窄工具集；解析失败给出可见提示，会话继续
        let mut skill_context: Option<String> = None;
        let mut allowed_tools: Option<Vec<String>> = None;
        match self.skills.resolve(user_input).await {
            Some(Ok((skill, args))) => {
                tracing::info!(skill = %skill.name, "skill command matched");
                skill_context = Some(skill.prompt_section(&args, session_id));
                if !skill.allowed_tools.is_empty() {
                    allowed_tools = Some(skill.allowed_tools.clone());
                }
            }
            Some(Err(e)) => {
                tracing::warn!("skill resolution failed: {}", e);
                send_event(&self.events.as_ref(), AgentEvent::Error {
                    text: e.to_string(),
                });
                return format!("技能解析失败：{}", e);
            }
            None => {}
        }

        // 2. 预算内上下文
        let context = self.memory.get_context();

        // 3. 计划
        let plan = self
            .planner
            .plan(user_input, &context, skill_context.as_deref(), self.events.as_ref())
            .await;
        send_event(&self.events.as_ref(), AgentEvent::PlanDone {
            plan: plan.as_text(),
        });

        // 4. ReAct 循环
        let mut session = ReactSession::new(self.llm.clone(), &self.executor, self.max_iterations)
            .with_cancel_token(self.cancel_token.clone());
        if let Some(ref allowed) = allowed_tools {
            session = session.with_allowed_tools(allowed);
        }
        if let Some(ref tx) = self.events {
            session = session.with_events(tx);
        }

        let outcome = match react_loop(
            &session,
            &plan,
            &context,
            user_input,
            skill_context.as_deref(),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(AgentError::Cancelled) => return "已取消本轮生成。".to_string(),
            Err(e) => {
                tracing::error!("react loop aborted: {}", e);
                return format!("本轮处理失败：{}", e);
            }
        };
        for (i, step) in outcome.trace.steps.iter().enumerate() {
            tracing::debug!(step = i, tool = %step.tool, observation = %step.observation, "trace");
        }

        // 5. 反思复核
        let reflection = self
            .reflector
            .reflect(user_input, &outcome.answer, self.events.as_ref())
            .await;

        // 6. 写记忆（含 fire-and-forget 落库）
        self.memory
            .add_interaction(
                user_input,
                &reflection.final_answer,
                &plan.as_text(),
                &reflection.critique,
                session_id,
            )
            .await;

        // 7. 返回最终回答
        reflection.final_answer
    }
}
