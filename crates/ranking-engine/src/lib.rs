//! 规则排序引擎
//!
//! 根据存储的规则为候选记录排序，支持：
//! - 主体条件与候选条件的合取匹配
//! - 数值比较、字符串相等与集合成员判断
//! - 评估前对照字段结构编译校验规则
//! - 按命中规则数降序、候选 ID 升序输出

pub mod cli;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod models;
pub mod operators;
pub mod provider;
pub mod ranking;
pub mod record;
pub mod service;
pub mod store;

pub use compiler::{CompiledRule, RuleCompiler};
pub use error::{RankingError, Result, RuleRejection};
pub use evaluator::ConditionEvaluator;
pub use matcher::RuleMatcher;
pub use models::{Condition, ConditionRow, ConditionValue, Rule, RuleRow, RuleSignature};
pub use operators::{Operator, Scope};
pub use provider::{RecordDecoder, RecordProvider, StaticRecordProvider};
pub use ranking::{RankedCandidate, RankingEngine, RankingOptions, RankingOutcome};
pub use record::{Candidate, FieldAccessor, FieldKind, FieldValue, Record, RecordSchema, Subject};
pub use service::RankingService;
pub use store::{LoadReport, RuleRepository, RuleSnapshot, RuleStore, RuleStoreStats};
