//! 记忆管理器
//!
//! 持有完整对话的明细消息与一条滚动摘要：get_context 返回预算内的上下文
//! （摘要 + 最近 max_messages 条），add_interaction 追加新回合并在明细条数
//! 超过 summary_trigger 时把旧消息折叠进摘要（单向、有损）。
//! 落库走 fire-and-forget，失败只记日志，不影响记忆本身。

use std::sync::Arc;

use crate::config::MemorySection;
use crate::llm::LlmClient;
use crate::memory::{ConversationSink, Message, Role, Turn, TurnRecord};

const SUMMARY_PROMPT: &str = "Summarize the conversation for future context. \
Keep key facts, user preferences, decisions, and tasks. Be concise.";

/// 每会话一个实例，由编排器持有；对话状态只通过 add_interaction 变更
pub struct MemoryManager {
    llm: Arc<dyn LlmClient>,
    sink: Option<Arc<dyn ConversationSink>>,
    turns: Vec<Turn>,
    summary: String,
    max_messages: usize,
    summary_trigger: usize,
    summary_keep: usize,
}

impl MemoryManager {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &MemorySection) -> Self {
        Self {
            llm,
            sink: None,
            turns: Vec::new(),
            summary: String::new(),
            max_messages: cfg.max_messages,
            summary_trigger: cfg.summary_trigger,
            summary_keep: cfg.summary_keep,
        }
    }

    /// 设置落库端（可选）
    pub fn with_sink(mut self, sink: Arc<dyn ConversationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 预算内的上下文：摘要（若非空）作为一条 system 消息在前，
    /// 随后是最近 max_messages 条明细消息，从旧到新
    pub fn get_context(&self) -> Vec<Message> {
        let mut context = Vec::new();
        if !self.summary.is_empty() {
            context.push(Message::system(format!(
                "Summary of previous conversation:\n{}",
                self.summary
            )));
        }
        let start = self.turns.len().saturating_sub(self.max_messages);
        context.extend(self.turns[start..].iter().map(Turn::to_message));
        context
    }

    /// 追加一个回合（user/assistant 对）并落库，必要时折叠旧消息进摘要
    pub async fn add_interaction(
        &mut self,
        user_input: &str,
        assistant_output: &str,
        plan: &str,
        reflection: &str,
        session_id: Option<&str>,
    ) {
        self.turns.push(Turn::new(Role::User, user_input));
        self.turns.push(Turn::new(Role::Assistant, assistant_output));

        self.dispatch_record(TurnRecord {
            session_id: session_id.map(String::from),
            user_input: user_input.to_string(),
            assistant_output: assistant_output.to_string(),
            plan: plan.to_string(),
            reflection: reflection.to_string(),
            created_at: chrono::Utc::now(),
        });

        self.maybe_fold().await;
    }

    /// 明细消息条数
    pub fn detailed_len(&self) -> usize {
        self.turns.len()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// 落库 fire-and-forget：不等待结果，失败由后台任务记日志
    fn dispatch_record(&self, record: TurnRecord) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = sink.append(record).await {
                tracing::warn!("conversation sink append failed: {}", e);
            }
        });
    }

    /// 摘要折叠：明细超过 summary_trigger 时，把除最近 summary_keep 条外的
    /// 消息摘要进 summary 并从明细中移除。摘要调用失败则跳过本次折叠，
    /// 明细保持不变，下次触发时重试。
    async fn maybe_fold(&mut self) {
        if self.turns.len() <= self.summary_trigger {
            return;
        }

        let keep_from = self.turns.len().saturating_sub(self.summary_keep);
        if keep_from == 0 {
            return;
        }

        let mut input = format_turns(&self.turns[..keep_from]);
        if !self.summary.is_empty() {
            input = format!(
                "Existing summary:\n{}\n\nNew conversation:\n{}",
                self.summary, input
            );
        }

        let messages = vec![Message::system(SUMMARY_PROMPT), Message::user(input)];
        match self.llm.complete(&messages).await {
            Ok(text) if !text.trim().is_empty() => {
                self.summary = text.trim().to_string();
                self.turns.drain(..keep_from);
                tracing::debug!(kept = self.turns.len(), "folded conversation into summary");
            }
            Ok(_) => {
                tracing::warn!("summarization returned empty text, fold skipped");
            }
            Err(e) => {
                tracing::warn!("summarization failed, fold skipped: {}", e);
            }
        }
    }
}

fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{}: {}", role, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
