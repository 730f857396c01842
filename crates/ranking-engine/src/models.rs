//! 规则领域模型
//!
//! 规则由若干条件组成，条件按作用域划分为主体条件与候选条件，
//! 规则的有效谓词是所有条件的合取。

use crate::error::{RankingError, Result};
use crate::operators::{Operator, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// 条件取值：文本与数值二选一
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Text(String),
    Numeric(f64),
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Numeric(n) => write!(f, "{}", n),
        }
    }
}

/// 条件的存储行形态
///
/// 与 `rule_conditions` 表一一对应，`table_name` / `column_name` 作为别名兼容旧的列名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRow {
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(alias = "table_name")]
    pub scope: String,
    #[serde(alias = "column_name")]
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value_text: Option<String>,
    #[serde(default)]
    pub value_numeric: Option<f64>,
}

/// 条件
///
/// 只能通过校验构造：操作符合法、字段非空、取值二选一且与操作符兼容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionRow", into = "ConditionRow")]
pub struct Condition {
    id: String,
    scope: Scope,
    field: String,
    operator: Operator,
    value: ConditionValue,
}

impl Condition {
    pub fn new(
        scope: Scope,
        field: impl Into<String>,
        operator: Operator,
        value: ConditionValue,
    ) -> Result<Self> {
        Self::with_id(Uuid::new_v4().to_string(), scope, field, operator, value)
    }

    pub fn with_id(
        id: impl Into<String>,
        scope: Scope,
        field: impl Into<String>,
        operator: Operator,
        value: ConditionValue,
    ) -> Result<Self> {
        let id = id.into();
        let field = field.into().trim().to_string();

        if field.is_empty() {
            return Err(RankingError::EmptyField { condition_id: id });
        }

        if let ConditionValue::Numeric(n) = value {
            if !n.is_finite() {
                return Err(RankingError::NonFiniteValue { condition_id: id });
            }
        }

        if operator.is_numeric_only() && !matches!(value, ConditionValue::Numeric(_)) {
            return Err(RankingError::OperatorValueMismatch {
                condition_id: id,
                operator,
            });
        }

        Ok(Self {
            id,
            scope,
            field,
            operator,
            value,
        })
    }

    /// 数值条件
    pub fn numeric(
        scope: Scope,
        field: impl Into<String>,
        operator: Operator,
        value: f64,
    ) -> Result<Self> {
        Self::new(scope, field, operator, ConditionValue::Numeric(value))
    }

    /// 文本条件（标量相等或集合成员）
    pub fn text(
        scope: Scope,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Result<Self> {
        Self::new(scope, field, operator, ConditionValue::Text(value.into()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &ConditionValue {
        &self.value
    }

    /// 转为存储行
    pub fn to_row(&self, rule_id: Option<&str>) -> ConditionRow {
        let (value_text, value_numeric) = match &self.value {
            ConditionValue::Text(s) => (Some(s.clone()), None),
            ConditionValue::Numeric(n) => (None, Some(*n)),
        };

        ConditionRow {
            condition_id: Some(self.id.clone()),
            rule_id: rule_id.map(str::to_string),
            scope: self.scope.to_string(),
            field: self.field.clone(),
            operator: self.operator.token().to_string(),
            value_text,
            value_numeric,
        }
    }
}

impl TryFrom<ConditionRow> for Condition {
    type Error = RankingError;

    fn try_from(row: ConditionRow) -> Result<Self> {
        let id = row
            .condition_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let scope: Scope = row.scope.parse()?;
        let operator: Operator = row.operator.parse()?;

        let value = match (row.value_text, row.value_numeric) {
            (Some(text), None) => ConditionValue::Text(text),
            (None, Some(numeric)) => ConditionValue::Numeric(numeric),
            (None, None) => return Err(RankingError::MissingValue { condition_id: id }),
            (Some(_), Some(_)) => {
                return Err(RankingError::ConflictingValues { condition_id: id });
            }
        };

        Self::with_id(id, scope, row.field, operator, value)
    }
}

impl From<Condition> for ConditionRow {
    fn from(condition: Condition) -> Self {
        condition.to_row(None)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

/// 规则的存储行形态（不含条件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRow {
    pub rule_id: String,
    pub target_value: i64,
}

/// 规则的 JSON 定义形态
#[derive(Debug, Deserialize)]
struct RuleDef {
    #[serde(default, alias = "id")]
    rule_id: Option<String>,
    target_value: i64,
    #[serde(default)]
    conditions: Vec<Condition>,
}

/// 规则
///
/// 创建后不可变，由规则存储持有。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleDef")]
pub struct Rule {
    #[serde(rename = "rule_id")]
    id: String,
    target_value: i64,
    conditions: Vec<Condition>,
}

impl Rule {
    pub fn new(target_value: i64, conditions: Vec<Condition>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_value,
            conditions,
        }
    }

    pub fn with_id(
        id: impl Into<String>,
        target_value: i64,
        conditions: Vec<Condition>,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RankingError::EmptyRuleId);
        }

        Ok(Self {
            id,
            target_value,
            conditions,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_value(&self) -> i64 {
        self.target_value
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// 指定作用域的条件
    pub fn conditions_for(&self, scope: Scope) -> impl Iterator<Item = &Condition> + '_ {
        self.conditions.iter().filter(move |c| c.scope() == scope)
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// 规则签名：两个作用域的 (字段, 操作符) 集合与目标值
    pub fn signature(&self) -> RuleSignature {
        let key_set = |scope: Scope| -> BTreeSet<(String, Operator)> {
            self.conditions_for(scope)
                .map(|c| (c.field().to_string(), c.operator()))
                .collect()
        };

        RuleSignature {
            subject: key_set(Scope::Subject),
            candidate: key_set(Scope::Candidate),
            target_value: self.target_value,
        }
    }

    /// 目标值相同，且两个作用域的签名都是对方的子集
    pub fn is_subset_of(&self, other: &Rule) -> bool {
        if self.target_value != other.target_value {
            return false;
        }

        let mine = self.signature();
        let theirs = other.signature();
        mine.subject.is_subset(&theirs.subject) && mine.candidate.is_subset(&theirs.candidate)
    }

    /// 是对方的子集且条件数更多
    pub fn is_more_specific_than(&self, other: &Rule) -> bool {
        self.is_subset_of(other) && self.condition_count() > other.condition_count()
    }

    /// 展开为存储行
    pub fn to_rows(&self) -> (RuleRow, Vec<ConditionRow>) {
        let rule_row = RuleRow {
            rule_id: self.id.clone(),
            target_value: self.target_value,
        };
        let condition_rows = self
            .conditions
            .iter()
            .map(|c| c.to_row(Some(&self.id)))
            .collect();

        (rule_row, condition_rows)
    }
}

impl TryFrom<RuleDef> for Rule {
    type Error = RankingError;

    fn try_from(def: RuleDef) -> Result<Self> {
        match def.rule_id {
            Some(id) => Self::with_id(id, def.target_value, def.conditions),
            None => Ok(Self::new(def.target_value, def.conditions)),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 主体条件在前，候选条件在后
        let mut parts = self
            .conditions_for(Scope::Subject)
            .chain(self.conditions_for(Scope::Candidate))
            .map(|c| c.to_string())
            .peekable();

        write!(f, "IF ")?;
        if parts.peek().is_none() {
            write!(f, "TRUE")?;
        }
        for (i, part) in parts.enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, " THEN target = {}", self.target_value)
    }
}

/// 规则签名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSignature {
    pub subject: BTreeSet<(String, Operator)>,
    pub candidate: BTreeSet<(String, Operator)>,
    pub target_value: i64,
}
