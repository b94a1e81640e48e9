//! Planner：把用户请求变成一份有界的分步计划
//!
//! 一次 LLM 调用要求输出编号列表，编号行解析为步骤并截断到上限；
//! 解析不出任何步骤或上游调用失败时，退化为「原文请求」单步计划，从不报错。
//! 流式只用于展示（PlanChunk 事件），解析始终基于完整文本。

use std::sync::{Arc, OnceLock};

use futures_util::StreamExt;
use regex::Regex;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::events::{send_event, AgentEvent, EventSender};

/// 有序步骤列表，长度受 max_steps 约束
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<String>,
}

impl Plan {
    pub fn single(step: impl Into<String>) -> Self {
        Self {
            steps: vec![step.into()],
        }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 编号文本形式，用于 prompt 注入与落库
    pub fn as_text(&self) -> String {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Planner：持有 LLM 与步数上限
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    max_steps: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, max_steps: usize) -> Self {
        Self { llm, max_steps }
    }

    /// 生成计划；events 存在时逐段推送 PlanChunk（仅展示用）
    pub async fn plan(
        &self,
        user_request: &str,
        context: &[Message],
        skill_context: Option<&str>,
        events: Option<&EventSender>,
    ) -> Plan {
        let mut system = format!(
            "You are a planning assistant. Create a concise, step-by-step plan \
             with at most {} steps. Use numbered steps. Return only the plan.",
            self.max_steps
        );
        if let Some(skill) = skill_context {
            system.push_str("\n\n");
            system.push_str(skill);
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(context.iter().cloned());
        messages.push(Message::user(format!("User request: {}", user_request)));

        let text = match self.resolve(&messages, events).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("planner completion failed, falling back to verbatim plan: {}", e);
                return Plan::single(user_request.trim());
            }
        };

        let mut steps = parse_steps(&text);
        steps.truncate(self.max_steps);
        if steps.is_empty() {
            return Plan::single(user_request.trim());
        }
        Plan { steps }
    }

    /// 取完整文本：有事件消费端时走流式并逐段转发，否则一次非流式调用
    async fn resolve(
        &self,
        messages: &[Message],
        events: Option<&EventSender>,
    ) -> Result<String, String> {
        if events.is_none() {
            return self.llm.complete(messages).await;
        }

        let mut stream = self.llm.complete_stream(messages).await?;
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            send_event(&events, AgentEvent::PlanChunk {
                text: chunk.clone(),
            });
            buffer.push_str(&chunk);
        }
        Ok(buffer)
    }
}

/// 提取编号行（1. / 2) / 3、），行内文本去掉首尾空白
fn parse_steps(text: &str) -> Vec<String> {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    let re = NUMBERED.get_or_init(|| Regex::new(r"(?m)^\s*\d+\s*[.)、．]\s*(.+)$").unwrap());
    re.captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
