//! 技能系统
//!
//! 技能是一段预先编写好的任务指令（SKILL.md），用户以 `/name [参数]` 显式触发，
//! 渲染后的正文作为权威任务指令注入 Planner 与 ReAct 循环。
//!
//! 目录结构：
//! ```text
//! skills/
//! ├── review/
//! │   ├── SKILL.md        # 结构化头 + 正文模板
//! │   ├── templates/      # 支持文件（可选）
//! │   └── checklist.md    # 支持文件（可选）
//! └── ...
//! ```

pub mod skill;
pub mod store;

pub use skill::Skill;
pub use store::{SkillError, SkillStore, SkillStub};
