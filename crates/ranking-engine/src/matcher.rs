//! 规则匹配器
//!
//! 对规则的主体条件与候选条件分别做短路合取求值。

use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::Condition;
use crate::record::{Candidate, FieldAccessor, Subject};
use tracing::trace;

/// 规则匹配器
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleMatcher {
    evaluator: ConditionEvaluator,
}

impl RuleMatcher {
    pub fn new(evaluator: ConditionEvaluator) -> Self {
        Self { evaluator }
    }

    /// 主体条件是否全部满足，无主体条件时恒为 true
    pub fn matches_subject(&self, rule: &CompiledRule<'_>, subject: &Subject) -> Result<bool> {
        self.all(rule, rule.subject_conditions(), subject)
    }

    /// 候选条件是否全部满足，无候选条件时恒为 true
    pub fn matches_candidate(
        &self,
        rule: &CompiledRule<'_>,
        candidate: &Candidate,
    ) -> Result<bool> {
        self.all(rule, rule.candidate_conditions(), candidate)
    }

    /// AND: 遇到第一个不满足的条件立即返回
    fn all<R>(&self, rule: &CompiledRule<'_>, conditions: &[&Condition], record: &R) -> Result<bool>
    where
        R: FieldAccessor + ?Sized,
    {
        for condition in conditions {
            let kind = rule.field_kind(condition.scope(), condition.field());
            if !self.evaluator.evaluate_with_kind(condition, record, kind)? {
                trace!(rule_id = rule.id(), condition = %condition, "条件不满足，短路返回");
                return Ok(false);
            }
        }

        Ok(true)
    }
}
