//! 规则编译器
//!
//! 在评估前把规则拆分为主体条件与候选条件，并对照记录结构校验字段：
//! 字段必须可解析，声明类型必须与操作符及取值兼容。
//! 编译失败属于配置错误，不会在评估阶段被当作 false 处理。

use crate::error::{RankingError, Result};
use crate::models::{Condition, ConditionValue, Rule};
use crate::operators::{Operator, Scope};
use crate::record::{FieldKind, RecordSchema};
use std::collections::{BTreeMap, BTreeSet};

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule<'a> {
    rule: &'a Rule,
    subject_conditions: Vec<&'a Condition>,
    candidate_conditions: Vec<&'a Condition>,
    subject_kinds: BTreeMap<&'a str, FieldKind>,
    candidate_kinds: BTreeMap<&'a str, FieldKind>,
}

impl<'a> CompiledRule<'a> {
    /// 获取规则 ID
    pub fn id(&self) -> &str {
        self.rule.id()
    }

    pub fn rule(&self) -> &'a Rule {
        self.rule
    }

    pub fn subject_conditions(&self) -> &[&'a Condition] {
        &self.subject_conditions
    }

    pub fn candidate_conditions(&self) -> &[&'a Condition] {
        &self.candidate_conditions
    }

    /// 编译时解析出的字段类型，未经编译的规则返回 `None`
    pub fn field_kind(&self, scope: Scope, field: &str) -> Option<FieldKind> {
        let kinds = match scope {
            Scope::Subject => &self.subject_kinds,
            Scope::Candidate => &self.candidate_kinds,
        };
        kinds.get(field).copied()
    }

    /// 规则中使用的所有 (作用域, 字段)
    pub fn required_fields(&self) -> BTreeSet<(Scope, &'a str)> {
        self.subject_conditions
            .iter()
            .chain(self.candidate_conditions.iter())
            .map(|c| (c.scope(), c.field()))
            .collect()
    }
}

/// 只做作用域拆分，不校验字段
impl<'a> From<&'a Rule> for CompiledRule<'a> {
    fn from(rule: &'a Rule) -> Self {
        Self {
            rule,
            subject_conditions: rule.conditions_for(Scope::Subject).collect(),
            candidate_conditions: rule.conditions_for(Scope::Candidate).collect(),
            subject_kinds: BTreeMap::new(),
            candidate_kinds: BTreeMap::new(),
        }
    }
}

/// 规则编译器
pub struct RuleCompiler<'s> {
    subject_schema: &'s RecordSchema,
    candidate_schema: &'s RecordSchema,
}

impl<'s> RuleCompiler<'s> {
    pub fn new(subject_schema: &'s RecordSchema, candidate_schema: &'s RecordSchema) -> Self {
        Self {
            subject_schema,
            candidate_schema,
        }
    }

    /// 编译规则
    pub fn compile<'a>(&self, rule: &'a Rule) -> Result<CompiledRule<'a>> {
        let mut compiled = CompiledRule::from(rule);
        for condition in rule.conditions() {
            let kind = self.validate_condition(condition)?;
            let kinds = match condition.scope() {
                Scope::Subject => &mut compiled.subject_kinds,
                Scope::Candidate => &mut compiled.candidate_kinds,
            };
            kinds.insert(condition.field(), kind);
        }

        Ok(compiled)
    }

    fn schema_for(&self, scope: Scope) -> &RecordSchema {
        match scope {
            Scope::Subject => self.subject_schema,
            Scope::Candidate => self.candidate_schema,
        }
    }

    /// 验证条件的字段与操作符、取值的兼容性，返回字段类型
    fn validate_condition(&self, condition: &Condition) -> Result<FieldKind> {
        let scope = condition.scope();
        let field = condition.field();

        let kind = self
            .schema_for(scope)
            .kind_of(field)
            .ok_or_else(|| RankingError::UnknownField {
                scope,
                field: field.to_string(),
            })?;

        let needs_number = match (condition.operator(), condition.value()) {
            (op, _) if op.is_numeric_only() => true,
            (Operator::Eq | Operator::Neq, ConditionValue::Numeric(_)) => true,
            // 文本相等对标量做字符串比较，对集合做成员判断
            _ => false,
        };

        if needs_number && kind != FieldKind::Numeric {
            return Err(RankingError::FieldKindMismatch {
                scope,
                field: field.to_string(),
                expected: FieldKind::Numeric,
                actual: kind,
            });
        }

        Ok(kind)
    }
}
