//! 工具箱：注册表、执行器与内置工具（calc、read_doc、echo）

pub mod calc;
pub mod doc_read;
pub mod echo;
pub mod executor;
pub mod registry;

pub use calc::CalcTool;
pub use doc_read::DocReadTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry, ToolSpec};
