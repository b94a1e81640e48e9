//! Mantis - Rust 对话智能体核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与回合编排器（Orchestrator）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话记忆（摘要折叠）与持久化落库
//! - **react**: Planner、ReAct 主循环、Reflector、过程事件
//! - **skills**: 技能系统（懒加载：stub -> materialized，/命令 触发）
//! - **tools**: 工具注册表与执行器（calc、read_doc、echo）

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod react;
pub mod skills;
pub mod tools;
