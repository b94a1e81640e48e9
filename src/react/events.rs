//! 回合过程事件：用于流式展示计划、思考、工具调用、观察与回复
//!
//! 事件只做展示，不参与任何逻辑步骤的排序；消费端缺席时事件被静默丢弃。

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 计划文本的一小段（流式输出）
    PlanChunk { text: String },
    /// 计划解析完成
    PlanDone { plan: String },
    /// 正在调用 LLM 思考
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具执行失败
    ToolFailure { tool: String, reason: String },
    /// 最终回复的一小段（流式输出）
    AnswerChunk { text: String },
    /// 最终回复结束
    AnswerDone,
    /// 反思批注
    Critique { text: String },
    /// 错误
    Error { text: String },
}

/// 事件发送端；缺席时所有 send 都是空操作
pub type EventSender = tokio::sync::mpsc::UnboundedSender<AgentEvent>;

pub(crate) fn send_event(tx: &Option<&EventSender>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
