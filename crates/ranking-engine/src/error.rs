//! 排序引擎错误类型

use crate::operators::{Operator, Scope};
use crate::record::FieldKind;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    // ==================== 配置错误（定义或编译时发现） ====================
    #[error("未知操作符: {0}")]
    UnknownOperator(String),

    #[error("未知作用域: {0}")]
    UnknownScope(String),

    #[error("规则 ID 不能为空")]
    EmptyRuleId,

    #[error("条件 {condition_id} 的字段不能为空")]
    EmptyField { condition_id: String },

    #[error("条件 {condition_id} 未填写 value_text 或 value_numeric")]
    MissingValue { condition_id: String },

    #[error("条件 {condition_id} 同时填写了 value_text 和 value_numeric")]
    ConflictingValues { condition_id: String },

    #[error("条件 {condition_id} 的 value_numeric 不是有限数值")]
    NonFiniteValue { condition_id: String },

    #[error("条件 {condition_id} 的操作符 {operator} 只接受数值")]
    OperatorValueMismatch {
        condition_id: String,
        operator: Operator,
    },

    #[error("字段无法解析: {scope}.{field}")]
    UnknownField { scope: Scope, field: String },

    #[error("字段类型不匹配: {scope}.{field} 期望 {expected}, 实际 {actual}")]
    FieldKindMismatch {
        scope: Scope,
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },

    #[error("条件 {condition_id} 引用了不存在的规则 {rule_id}")]
    OrphanCondition {
        condition_id: String,
        rule_id: String,
    },

    // ==================== 评估错误（只影响所在规则） ====================
    #[error("字段不存在: {0}")]
    FieldNotFound(String),

    #[error("类型不匹配: 字段 {field} 期望 {expected}, 实际 {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    // ==================== 存储与输入 ====================
    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("规则已存在: {0}")]
    DuplicateRule(String),

    #[error("规则 {rule_id} 非法: {source}")]
    InvalidRule {
        rule_id: String,
        #[source]
        source: Box<RankingError>,
    },

    #[error("记录格式错误: {0}")]
    InvalidRecord(String),

    #[error("数据提供方错误: {0}")]
    Provider(String),

    #[error("排序超时: 超过 {0} ms")]
    Timeout(u64),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RankingError>;

impl RankingError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownOperator(_) => "UNKNOWN_OPERATOR",
            Self::UnknownScope(_) => "UNKNOWN_SCOPE",
            Self::EmptyRuleId => "EMPTY_RULE_ID",
            Self::EmptyField { .. } => "EMPTY_FIELD",
            Self::MissingValue { .. } => "MISSING_VALUE",
            Self::ConflictingValues { .. } => "CONFLICTING_VALUES",
            Self::NonFiniteValue { .. } => "NON_FINITE_VALUE",
            Self::OperatorValueMismatch { .. } => "OPERATOR_VALUE_MISMATCH",
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::FieldKindMismatch { .. } => "FIELD_KIND_MISMATCH",
            Self::OrphanCondition { .. } => "ORPHAN_CONDITION",
            Self::FieldNotFound(_) => "FIELD_NOT_FOUND",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::DuplicateRule(_) => "DUPLICATE_RULE",
            Self::InvalidRule { source, .. } => source.code(),
            Self::InvalidRecord(_) => "INVALID_RECORD",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否为配置错误（规则或条件本身定义有误）
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::UnknownOperator(_)
            | Self::UnknownScope(_)
            | Self::EmptyRuleId
            | Self::EmptyField { .. }
            | Self::MissingValue { .. }
            | Self::ConflictingValues { .. }
            | Self::NonFiniteValue { .. }
            | Self::OperatorValueMismatch { .. }
            | Self::UnknownField { .. }
            | Self::FieldKindMismatch { .. }
            | Self::OrphanCondition { .. } => true,
            Self::InvalidRule { source, .. } => source.is_config_error(),
            _ => false,
        }
    }
}

/// 被拒绝（跳过）的规则及原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRejection {
    pub rule_id: String,
    pub code: &'static str,
    pub reason: String,
}

impl RuleRejection {
    pub fn new(rule_id: impl Into<String>, error: &RankingError) -> Self {
        Self {
            rule_id: rule_id.into(),
            code: error.code(),
            reason: error.to_string(),
        }
    }
}
