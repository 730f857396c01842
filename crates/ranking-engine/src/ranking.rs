//! 排序聚合器
//!
//! 对每条规则独立求值：主体条件不满足则跳过该规则，否则按输入顺序匹配候选，
//! 累计每个候选满足的规则数，最后按命中数降序、候选 ID 升序输出。
//!
//! 计数表在每次调用内创建，调用结束即丢弃，不存在跨调用的共享状态。

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::error::{RankingError, Result, RuleRejection};
use crate::evaluator::ConditionEvaluator;
use crate::matcher::RuleMatcher;
use crate::models::Rule;
use crate::record::{Candidate, RecordSchema, Subject};
use ranker_shared::config::{InvalidRulePolicy, MissingFieldPolicy, RankingConfig};
use ranker_shared::observability::metrics::{record_ranking, record_rule_rejected};
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// 排序结果中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCandidate {
    pub candidate_id: i64,
    pub display_name: String,
    pub match_count: usize,
}

/// 一次排序调用的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingOutcome {
    pub ranking: Vec<RankedCandidate>,
    /// 被跳过的规则（配置错误或评估失败）
    pub rejected_rules: Vec<RuleRejection>,
    /// 编译通过并参与评估的规则数
    pub rules_evaluated: usize,
    /// 至少为一个候选计数的规则数
    pub rules_fired: usize,
}

impl RankingOutcome {
    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }
}

/// 排序选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankingOptions {
    pub invalid_rule_policy: InvalidRulePolicy,
    pub missing_field_policy: MissingFieldPolicy,
    pub limit: Option<usize>,
}

impl From<&RankingConfig> for RankingOptions {
    fn from(config: &RankingConfig) -> Self {
        Self {
            invalid_rule_policy: config.invalid_rule_policy,
            missing_field_policy: config.missing_field_policy,
            limit: config.limit,
        }
    }
}

/// 单次调用内的命中计数表
#[derive(Default)]
struct MatchTally<'c> {
    entries: HashMap<i64, (&'c str, usize)>,
}

impl<'c> MatchTally<'c> {
    /// 提交一条规则匹配到的候选
    fn commit(&mut self, matched: &[&'c Candidate]) {
        for candidate in matched {
            let entry = self
                .entries
                .entry(candidate.id())
                .or_insert((candidate.display_name(), 0));
            entry.1 += 1;
        }
    }

    fn into_ranking(self, limit: Option<usize>) -> Vec<RankedCandidate> {
        let mut ranking: Vec<RankedCandidate> = self
            .entries
            .into_iter()
            .map(|(candidate_id, (display_name, match_count))| RankedCandidate {
                candidate_id,
                display_name: display_name.to_string(),
                match_count,
            })
            .collect();

        ranking.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        if let Some(limit) = limit {
            ranking.truncate(limit);
        }

        ranking
    }
}

/// 排序引擎
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    options: RankingOptions,
    matcher: RuleMatcher,
}

impl RankingEngine {
    pub fn new(options: RankingOptions) -> Self {
        Self {
            options,
            matcher: RuleMatcher::new(ConditionEvaluator::new(options.missing_field_policy)),
        }
    }

    pub fn options(&self) -> &RankingOptions {
        &self.options
    }

    /// 排序，字段结构从本次输入的记录推断
    pub fn rank<R>(
        &self,
        rules: &[R],
        subject: &Subject,
        candidates: &[Candidate],
    ) -> Result<RankingOutcome>
    where
        R: Borrow<Rule>,
    {
        let subject_schema = RecordSchema::infer(std::iter::once(subject));
        let candidate_schema = RecordSchema::infer(candidates.iter().map(Candidate::record));

        self.rank_with_schemas(rules, subject, candidates, &subject_schema, &candidate_schema)
    }

    /// 使用声明的字段结构排序
    pub fn rank_with_schemas<R>(
        &self,
        rules: &[R],
        subject: &Subject,
        candidates: &[Candidate],
        subject_schema: &RecordSchema,
        candidate_schema: &RecordSchema,
    ) -> Result<RankingOutcome>
    where
        R: Borrow<Rule>,
    {
        self.rank_until(rules, subject, candidates, subject_schema, candidate_schema, None)
    }

    /// 带截止时间排序
    ///
    /// 每条规则求值前与返回前检查截止时间，超过即返回 `Timeout`，不输出部分结果。
    pub fn rank_with_deadline<R>(
        &self,
        rules: &[R],
        subject: &Subject,
        candidates: &[Candidate],
        subject_schema: &RecordSchema,
        candidate_schema: &RecordSchema,
        deadline: Instant,
    ) -> Result<RankingOutcome>
    where
        R: Borrow<Rule>,
    {
        self.rank_until(
            rules,
            subject,
            candidates,
            subject_schema,
            candidate_schema,
            Some(deadline),
        )
    }

    #[instrument(
        skip_all,
        fields(rules = rules.len(), candidates = candidates.len())
    )]
    fn rank_until<R>(
        &self,
        rules: &[R],
        subject: &Subject,
        candidates: &[Candidate],
        subject_schema: &RecordSchema,
        candidate_schema: &RecordSchema,
        deadline: Option<Instant>,
    ) -> Result<RankingOutcome>
    where
        R: Borrow<Rule>,
    {
        let start = Instant::now();
        check_deadline(deadline, start)?;

        if rules.is_empty() || candidates.is_empty() {
            debug!("规则或候选为空，返回空排序");
            record_ranking("empty", 0, start.elapsed().as_secs_f64());
            return Ok(RankingOutcome::default());
        }

        let candidates = dedupe_candidates(candidates);
        let compiler = RuleCompiler::new(subject_schema, candidate_schema);
        let mut tally = MatchTally::default();
        let mut outcome = RankingOutcome::default();

        for rule in rules {
            check_deadline(deadline, start)?;
            let rule: &Rule = rule.borrow();
            let compiled = match compiler.compile(rule) {
                Ok(compiled) => compiled,
                Err(err) => {
                    if self.options.invalid_rule_policy == InvalidRulePolicy::Reject {
                        warn!(rule_id = %rule.id(), error = %err, "规则非法，拒绝本次排序");
                        record_rule_rejected(err.code());
                        record_ranking("rejected", 0, start.elapsed().as_secs_f64());
                        return Err(RankingError::InvalidRule {
                            rule_id: rule.id().to_string(),
                            source: Box::new(err),
                        });
                    }

                    warn!(rule_id = %rule.id(), error = %err, "规则非法，已跳过");
                    record_rule_rejected(err.code());
                    outcome.rejected_rules.push(RuleRejection::new(rule.id(), &err));
                    continue;
                }
            };

            outcome.rules_evaluated += 1;

            // 整条规则求值成功后才计入，失败的规则不贡献任何计数
            match self.evaluate_rule(&compiled, subject, &candidates) {
                Ok(matched) if matched.is_empty() => {}
                Ok(matched) => {
                    outcome.rules_fired += 1;
                    tally.commit(&matched);
                }
                Err(err) => {
                    warn!(rule_id = %rule.id(), error = %err, "规则评估失败，已跳过");
                    record_rule_rejected(err.code());
                    outcome.rejected_rules.push(RuleRejection::new(rule.id(), &err));
                }
            }
        }

        check_deadline(deadline, start)?;
        outcome.ranking = tally.into_ranking(self.options.limit);

        let elapsed = start.elapsed();
        record_ranking("ok", outcome.rules_fired, elapsed.as_secs_f64());
        info!(
            ranked = outcome.ranking.len(),
            rules_evaluated = outcome.rules_evaluated,
            rules_fired = outcome.rules_fired,
            rejected = outcome.rejected_rules.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "排序完成"
        );

        Ok(outcome)
    }

    /// 对照字段结构编译所有规则，返回不合法的规则
    pub fn check_rules<R>(
        &self,
        rules: &[R],
        subject_schema: &RecordSchema,
        candidate_schema: &RecordSchema,
    ) -> Vec<RuleRejection>
    where
        R: Borrow<Rule>,
    {
        let compiler = RuleCompiler::new(subject_schema, candidate_schema);

        rules
            .iter()
            .filter_map(|rule| {
                let rule: &Rule = rule.borrow();
                compiler
                    .compile(rule)
                    .err()
                    .map(|err| RuleRejection::new(rule.id(), &err))
            })
            .collect()
    }

    /// 求值单条规则，返回满足候选条件的候选
    fn evaluate_rule<'c>(
        &self,
        rule: &CompiledRule<'_>,
        subject: &Subject,
        candidates: &[&'c Candidate],
    ) -> Result<Vec<&'c Candidate>> {
        if !self.matcher.matches_subject(rule, subject)? {
            debug!(rule_id = %rule.id(), "主体条件不满足，跳过规则");
            return Ok(Vec::new());
        }

        let mut matched = Vec::new();
        for candidate in candidates {
            if self.matcher.matches_candidate(rule, candidate)? {
                matched.push(*candidate);
            }
        }

        Ok(matched)
    }
}

/// 超过截止时间时返回 `Timeout`（已耗时毫秒数）
fn check_deadline(deadline: Option<Instant>, start: Instant) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            let elapsed = start.elapsed();
            warn!(elapsed_ms = elapsed.as_millis() as u64, "已超过截止时间，停止排序");
            record_ranking("timeout", 0, elapsed.as_secs_f64());
            Err(RankingError::Timeout(elapsed.as_millis() as u64))
        }
        _ => Ok(()),
    }
}

/// 按 ID 去重，保留首次出现的候选
fn dedupe_candidates(candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());

    candidates
        .iter()
        .filter(|candidate| {
            let first = seen.insert(candidate.id());
            if !first {
                warn!(candidate_id = candidate.id(), "候选 ID 重复，忽略后续出现");
            }
            first
        })
        .collect()
}
