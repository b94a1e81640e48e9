//! Reflector：对草稿回答做一次批判性复核
//!
//! 一次 LLM 调用按 accuracy / completeness / clarity 审视草稿，可给出修订版；
//! 输出契约为 "Reflection: <批注>\nFinal: <最终回答>"。解析失败或上游失败时
//! 一律视为通过、草稿原样放行，绝不因复核阻塞回合。

use std::sync::Arc;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::events::{send_event, AgentEvent, EventSender};

const REFLECT_PROMPT: &str = "You are a reflection assistant. Critique the draft answer for accuracy, \
completeness, and clarity. If you can improve it, provide a revised final answer. \
If no changes are needed, keep the final answer the same.\n\n\
Output format:\n\
Reflection: <short notes>\n\
Final: <final answer>\n\
Return only this format.";

/// 复核结论：通过（草稿原样）或已修订
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Revised,
}

/// 单回合的复核产物，随回合结束丢弃（批注文本会随记录落库）
#[derive(Debug, Clone)]
pub struct Reflection {
    pub verdict: Verdict,
    pub critique: String,
    pub final_answer: String,
}

impl Reflection {
    fn approved(draft: &str) -> Self {
        Self {
            verdict: Verdict::Approved,
            critique: String::new(),
            final_answer: draft.to_string(),
        }
    }
}

/// Reflector：持有 LLM，reflect(user_request, draft) 返回 Reflection
pub struct Reflector {
    llm: Arc<dyn LlmClient>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn reflect(
        &self,
        user_request: &str,
        draft: &str,
        events: Option<&EventSender>,
    ) -> Reflection {
        let messages = vec![
            Message::system(REFLECT_PROMPT),
            Message::user(format!(
                "User request: {}\n\nDraft answer:\n{}",
                user_request, draft
            )),
        ];

        let text = match self.llm.complete(&messages).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("reflection failed, approving draft unchanged: {}", e);
                return Reflection::approved(draft);
            }
        };

        let reflection = parse_reflection(&text, draft);
        if !reflection.critique.is_empty() {
            send_event(&events, AgentEvent::Critique {
                text: reflection.critique.clone(),
            });
        }
        reflection
    }
}

/// 解析 "Reflection: ...\nFinal: ..."；缺少 Final 标记时视为通过
fn parse_reflection(text: &str, draft: &str) -> Reflection {
    let Some(idx) = text.find("Final:") else {
        return Reflection::approved(draft);
    };

    let (before, after) = text.split_at(idx);
    let final_answer = after["Final:".len()..].trim();
    let final_answer = if final_answer.is_empty() {
        draft
    } else {
        final_answer
    };

    let critique = before
        .find("Reflection:")
        .map(|i| before[i + "Reflection:".len()..].trim().to_string())
        .unwrap_or_default();

    let verdict = if final_answer.trim() == draft.trim() {
        Verdict::Approved
    } else {
        Verdict::Revised
    };

    Reflection {
        verdict,
        critique,
        final_answer: final_answer.to_string(),
    }
}
