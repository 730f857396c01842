//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 规则排序命令行工具
#[derive(Parser, Debug)]
#[command(name = "rule-ranker")]
#[command(version, about = "基于规则的候选排序工具")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，RUST_LOG 优先
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// 配置目录，默认读取 CONFIG_DIR 或 ./config
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// 运行环境，默认读取 RANKER_ENV 或 development
    #[arg(long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 为候选排序
    ///
    /// 规则文件为规则 JSON 数组；输入文件格式为
    /// `{"subject": {...}, "candidates": [...]}`。
    Rank {
        /// 规则文件路径
        #[arg(short, long)]
        rules: PathBuf,

        /// 主体与候选输入文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 只输出前 N 个候选
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// 任一规则非法即失败（默认跳过非法规则）
        #[arg(long)]
        reject_invalid: bool,
    },

    /// 校验规则文件
    ///
    /// 提供输入文件时，同时对照输入推断（或声明）的字段结构编译规则。
    Validate {
        /// 规则文件路径
        #[arg(short, long)]
        rules: PathBuf,

        /// 主体与候选输入文件路径
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// 列出规则
    Rules {
        /// 规则文件路径
        #[arg(short, long)]
        rules: PathBuf,

        /// 只列出指定目标值的规则
        #[arg(short, long)]
        target: Option<i64>,

        /// 跳过条数
        #[arg(long, default_value = "0")]
        offset: usize,

        /// 每页条数
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// 列出规则数不超过阈值的目标值
    Targets {
        /// 规则文件路径
        #[arg(short, long)]
        rules: PathBuf,

        /// 规则数上限
        #[arg(short, long)]
        max_rules: usize,
    },
}
