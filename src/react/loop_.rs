//! ReAct 主循环
//!
//! THINKING -> (ACTING -> OBSERVING)* -> DONE：每步把完整轨迹回放给 LLM，
//! 回复解析为 Action（JSON Tool Call）或 Final（最终回答）；未知工具与工具失败
//! 都转为 Observation 喂回轨迹继续推进，步数耗尽或上游失败时以最后草稿收尾。
//! 工具调用严格串行，下一步必须看到上一步的 Observation。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::planner::Plan;
use crate::tools::ToolExecutor;

/// 流式回复时每段字符数（模拟打字效果）
const CHUNK_CHARS: usize = 6;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "calc", "args": {"expression": "..."}}）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 单条回复解析出的指令：要么调工具，要么给最终回答
#[derive(Debug, Clone)]
pub enum Directive {
    Action(ToolCall),
    Final(String),
}

/// 解析 LLM 输出：有效 JSON 且 tool 非空则为 Action；"Final:" 标记取其后文本；
/// 其余（含畸形 JSON）一律折叠为 Final 原文，保证循环永不因解析失败卡死
pub fn parse_directive(output: &str) -> Directive {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()))
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        (start < end).then(|| trimmed[start..=end].trim())
    } else {
        None
    };

    if let Some(json_str) = json_str {
        if let Ok(call) = serde_json::from_str::<ToolCall>(json_str) {
            if !call.tool.is_empty() {
                return Directive::Action(call);
            }
        }
    }

    if let Some(idx) = trimmed.find("Final:") {
        return Directive::Final(trimmed[idx + "Final:".len()..].trim().to_string());
    }

    Directive::Final(trimmed.to_string())
}

/// 一次循环内的单步：动作 + 观察
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub tool: String,
    pub args: Value,
    pub observation: String,
}

/// 单次循环的完整轨迹，仅用于回合内日志，回合结束即丢弃
#[derive(Debug, Default)]
pub struct ReasoningTrace {
    pub steps: Vec<TraceStep>,
}

/// 循环执行结果：最终回答与轨迹
#[derive(Debug)]
pub struct ReactOutcome {
    pub answer: String,
    pub trace: ReasoningTrace,
}

/// ReAct 会话配置：LLM、执行器、步数预算与可选项
pub struct ReactSession<'a> {
    pub llm: Arc<dyn LlmClient>,
    pub executor: &'a ToolExecutor,
    /// 单回合最大步数，超出时以最后草稿强制收尾
    pub max_iterations: usize,
    /// 取消令牌：唯一会作为错误冒出的终止方式
    pub cancel_token: tokio_util::sync::CancellationToken,
    /// 可选：限制暴露给 LLM 的工具名列表（技能 allowed-tools）
    pub allowed_tools: Option<&'a [String]>,
    /// 可选：过程事件推送
    pub events: Option<&'a EventSender>,
}

impl<'a> ReactSession<'a> {
    pub fn new(llm: Arc<dyn LlmClient>, executor: &'a ToolExecutor, max_iterations: usize) -> Self {
        Self {
            llm,
            executor,
            max_iterations,
            cancel_token: tokio_util::sync::CancellationToken::new(),
            allowed_tools: None,
            events: None,
        }
    }

    pub fn with_allowed_tools(mut self, tools: &'a [String]) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_events(mut self, tx: &'a EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancel_token(mut self, token: tokio_util::sync::CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// 实际暴露的工具名：allowed_tools 非空时取交集，否则用执行器全部工具
    fn exposed_tool_names(&self) -> Vec<String> {
        let all = self.executor.tool_names();
        match self.allowed_tools {
            Some(allowed) if !allowed.is_empty() => all
                .into_iter()
                .filter(|n| allowed.iter().any(|a| a == n))
                .collect(),
            _ => all,
        }
    }
}

/// 执行 ReAct 循环：plan 与技能上下文拼进 system，context + user_input 作为起始对话
pub async fn react_loop(
    session: &ReactSession<'_>,
    plan: &Plan,
    context: &[Message],
    user_input: &str,
    skill_context: Option<&str>,
) -> Result<ReactOutcome, AgentError> {
    let events = session.events;
    let exposed = session.exposed_tool_names();
    let system = build_system_prompt(session, &exposed, plan, skill_context);

    let mut transcript = vec![Message::system(system)];
    transcript.extend(context.iter().cloned());
    transcript.push(Message::user(user_input));

    let mut trace = ReasoningTrace::default();
    let mut last_output = String::new();

    for step in 0..session.max_iterations {
        if session.cancel_token.is_cancelled() {
            send_event(&events, AgentEvent::Error {
                text: "Cancelled by user".to_string(),
            });
            return Err(AgentError::Cancelled);
        }

        send_event(&events, AgentEvent::Thinking);
        let output = match session.llm.complete(&transcript).await {
            Ok(o) => o,
            Err(e) => {
                // 上游失败不终止回合：以最后草稿（或固定降级提示）收尾
                tracing::warn!(step, "completion failed in react loop: {}", e);
                send_event(&events, AgentEvent::Error { text: e });
                let answer = degraded_answer(&last_output);
                emit_answer(&events, &answer);
                return Ok(ReactOutcome { answer, trace });
            }
        };
        last_output = output.clone();

        match parse_directive(&output) {
            Directive::Final(answer) => {
                emit_answer(&events, &answer);
                return Ok(ReactOutcome { answer, trace });
            }
            Directive::Action(call) => {
                send_event(&events, AgentEvent::ToolCall {
                    tool: call.tool.clone(),
                    args: call.args.clone(),
                });

                let observation = if !exposed.iter().any(|n| n == &call.tool) {
                    // 未知/未授权工具：合成观察喂回，循环继续
                    format!(
                        "Unknown tool '{}'. Available tools: {}",
                        call.tool,
                        exposed.join(", ")
                    )
                } else {
                    match session.executor.execute(&call.tool, call.args.clone()).await {
                        Ok(r) => r,
                        Err(e) => {
                            send_event(&events, AgentEvent::ToolFailure {
                                tool: call.tool.clone(),
                                reason: e.to_string(),
                            });
                            format!("Error: {}", e)
                        }
                    }
                };

                send_event(&events, AgentEvent::Observation {
                    tool: call.tool.clone(),
                    preview: preview(&observation),
                });

                trace.steps.push(TraceStep {
                    tool: call.tool.clone(),
                    args: call.args.clone(),
                    observation: observation.clone(),
                });

                // 动作与观察按序写回轨迹，下一步完成前不会发起新的调用
                transcript.push(Message::assistant(output));
                transcript.push(Message::user(format!("Observation: {}", observation)));
            }
        }
    }

    // 步数耗尽：以最后草稿强制收尾，而不是让回合失败
    tracing::info!(
        max_iterations = session.max_iterations,
        "react loop exhausted step budget, forcing termination"
    );
    let answer = degraded_answer(&last_output);
    emit_answer(&events, &answer);
    Ok(ReactOutcome { answer, trace })
}

fn build_system_prompt(
    session: &ReactSession<'_>,
    exposed: &[String],
    plan: &Plan,
    skill_context: Option<&str>,
) -> String {
    let specs = session.executor.specs();
    let tool_lines: Vec<String> = specs
        .iter()
        .filter(|s| exposed.iter().any(|n| n == &s.name))
        .map(|s| format!("- {}: {} Parameters: {}", s.name, s.description, s.parameters))
        .collect();
    let tools_block = if tool_lines.is_empty() {
        "- (no tools available)".to_string()
    } else {
        tool_lines.join("\n")
    };

    let mut parts = vec![
        "You are a tool-using assistant. Use tools when they are helpful.".to_string(),
        format!("Available tools:\n{}", tools_block),
    ];
    if let Some(skill) = skill_context {
        parts.push(skill.to_string());
    }
    if !plan.is_empty() {
        parts.push(format!(
            "Plan:\n{}\nFollow the plan but adjust if needed.",
            plan.as_text()
        ));
    }
    parts.push(
        "When you need a tool, respond with exactly one JSON object:\n\
         {\"tool\": \"<tool_name>\", \"args\": {...}}"
            .to_string(),
    );
    parts.push(
        "When you have the final answer, respond with exactly:\nFinal: <answer>".to_string(),
    );
    parts.push("Do not include any other text. Respond in the user's language.".to_string());
    parts.join("\n\n")
}

fn degraded_answer(last_output: &str) -> String {
    if last_output.is_empty() {
        "模型服务暂时不可用，本轮未能生成回答，请稍后重试。".to_string()
    } else {
        last_output.to_string()
    }
}

/// 打字效果：最终回答按小段推送（仅展示）
fn emit_answer(events: &Option<&EventSender>, answer: &str) {
    if events.is_none() {
        return;
    }
    let chars: Vec<char> = answer.chars().collect();
    for chunk in chars.chunks(CHUNK_CHARS) {
        send_event(events, AgentEvent::AnswerChunk {
            text: chunk.iter().collect(),
        });
    }
    send_event(events, AgentEvent::AnswerDone);
}

fn preview(observation: &str) -> String {
    let head: String = observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    if observation.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}
