//! 认知层：Planner、ReAct 主循环、Reflector、过程事件

pub mod events;
pub mod loop_;
pub mod planner;
pub mod reflector;

pub use events::{AgentEvent, EventSender};
pub use loop_::{
    parse_directive, react_loop, Directive, ReactOutcome, ReactSession, ReasoningTrace, ToolCall,
    TraceStep,
};
pub use planner::{Plan, Planner};
pub use reflector::{Reflection, Reflector, Verdict};
