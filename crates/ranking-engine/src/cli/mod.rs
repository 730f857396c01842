//! CLI 模块
//!
//! - `rank` - 为候选排序
//! - `validate` - 校验规则文件
//! - `rules` - 列出规则（可按目标值分页）
//! - `targets` - 列出规则数不超过阈值的目标值
//!
//! # 使用示例
//!
//! ```bash
//! rule-ranker rank -r rules.json -i input.json -n 10
//! rule-ranker validate -r rules.json -i input.json
//! rule-ranker rules -r rules.json -t 5114 --offset 20 --limit 20
//! rule-ranker targets -r rules.json -m 3
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
