//! 条件评估器
//!
//! 按操作符与取值类型评估单个条件：数值比较、字符串相等、集合成员。

use crate::error::{RankingError, Result};
use crate::models::{Condition, ConditionValue};
use crate::operators::Operator;
use crate::record::{FieldAccessor, FieldKind, FieldValue};
use ranker_shared::config::MissingFieldPolicy;
use std::collections::BTreeSet;

/// 条件评估器
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    missing_field_policy: MissingFieldPolicy,
}

impl ConditionEvaluator {
    pub fn new(missing_field_policy: MissingFieldPolicy) -> Self {
        Self {
            missing_field_policy,
        }
    }

    /// 评估条件
    ///
    /// 字段缺失时按策略返回 false 或 `FieldNotFound`；
    /// 数值比较遇到无法转换的取值时返回 `TypeMismatch`。
    pub fn evaluate<R>(&self, condition: &Condition, record: &R) -> Result<bool>
    where
        R: FieldAccessor + ?Sized,
    {
        self.evaluate_with_kind(condition, record, None)
    }

    /// 按已知字段类型评估条件
    ///
    /// 集合字段缺失等同于空集合：`==` 为 false，`!=` 为 true，不受缺失策略影响。
    pub fn evaluate_with_kind<R>(
        &self,
        condition: &Condition,
        record: &R,
        kind: Option<FieldKind>,
    ) -> Result<bool>
    where
        R: FieldAccessor + ?Sized,
    {
        let field = condition.field();
        let empty_set;

        let value = match record.field(field) {
            Some(v) => v,
            None if kind == Some(FieldKind::TextSet) => {
                empty_set = FieldValue::TextSet(BTreeSet::new());
                &empty_set
            }
            None => {
                return match self.missing_field_policy {
                    MissingFieldPolicy::Unsatisfied => Ok(false),
                    MissingFieldPolicy::Error => {
                        Err(RankingError::FieldNotFound(field.to_string()))
                    }
                };
            }
        };

        let expected = condition.value();
        match condition.operator() {
            Operator::Eq => Self::eq(field, value, expected),
            Operator::Neq => Self::eq(field, value, expected).map(|r| !r),
            Operator::Gt => Self::compare(field, value, expected, |a, b| a > b),
            Operator::Gte => Self::compare(field, value, expected, |a, b| a >= b),
            Operator::Lt => Self::compare(field, value, expected, |a, b| a < b),
            Operator::Lte => Self::compare(field, value, expected, |a, b| a <= b),
        }
    }

    /// 相等比较
    fn eq(field: &str, value: &FieldValue, expected: &ConditionValue) -> Result<bool> {
        match expected {
            ConditionValue::Numeric(n) => {
                let actual = Self::as_f64(field, value)?;
                Ok(Self::float_eq(actual, *n))
            }
            ConditionValue::Text(text) => Ok(match value {
                FieldValue::Text(s) => s == text,
                // 集合成员：直接比较元素，不加引号
                FieldValue::TextSet(set) => set.contains(text),
                FieldValue::Numeric(n) => text
                    .trim()
                    .parse::<f64>()
                    .map(|t| Self::float_eq(*n, t))
                    .unwrap_or(false),
            }),
        }
    }

    /// 数值比较
    fn compare<F>(field: &str, value: &FieldValue, expected: &ConditionValue, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let expected = match expected {
            ConditionValue::Numeric(n) => *n,
            // 条件创建时已拒绝数值操作符搭配文本取值
            ConditionValue::Text(_) => {
                return Err(RankingError::TypeMismatch {
                    field: field.to_string(),
                    expected: "numeric condition value".to_string(),
                    actual: "text".to_string(),
                });
            }
        };

        let actual = Self::as_f64(field, value)?;
        Ok(cmp(actual, expected))
    }

    /// 整数与浮点数统一按浮点比较（如 100 == 100.0）
    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < f64::EPSILON
    }

    /// 尝试将取值转换为 f64
    fn as_f64(field: &str, value: &FieldValue) -> Result<f64> {
        value.as_number().ok_or_else(|| RankingError::TypeMismatch {
            field: field.to_string(),
            expected: "number".to_string(),
            actual: value.kind().to_string(),
        })
    }
}
