//! # 规则存储模块
//!
//! 此模块负责：
//! 1. 读取文件风格或目录风格的 package.* 规则
//! 2. 按 flags 语法添加、修改、删除规则
//! 3. 以确定的顺序写回，并在两种布局之间转换

pub mod editor;
pub mod error;
pub mod formatter;
pub mod store;

pub use editor::{EditOutcome, RuleEditor};
pub use error::RuleError;
pub use formatter::RuleType;
pub use store::RuleStore;
