//! Agent 错误类型
//!
//! 上游服务失败、解析失败、落库失败都在各组件内按降级规则就地收敛，
//! 不会以错误形式冒出；这里只保留确实会跨组件传递的错误。

use thiserror::Error;

/// 跨组件传递的运行错误（工具执行、取消）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Cancelled")]
    Cancelled,
}
