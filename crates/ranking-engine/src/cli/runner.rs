//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑，结果以 JSON 写到标准输出。

use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use ranker_shared::config::{AppConfig, InvalidRulePolicy};
use ranker_shared::observability::metrics::record_rule_rejected;

use crate::models::Rule;
use crate::provider::{RecordDecoder, RecordProvider, StaticRecordProvider};
use crate::ranking::{RankingEngine, RankingOptions, RankingOutcome};
use crate::record::{Candidate, RecordSchema};
use crate::service::RankingService;
use crate::store::{LoadReport, RuleRepository, RuleStore, RuleStoreStats};

/// 规则列表中的一项
#[derive(Debug, Serialize)]
struct RuleListing {
    rule_id: String,
    target_value: i64,
    conditions: usize,
    description: String,
}

impl From<&Rule> for RuleListing {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id().to_string(),
            target_value: rule.target_value(),
            conditions: rule.condition_count(),
            description: rule.to_string(),
        }
    }
}

/// 更具体的规则与被它包含的规则
#[derive(Debug, Serialize)]
struct Subsumption {
    specific: String,
    general: String,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    #[serde(flatten)]
    load: LoadReport,
    schema_rejected: Vec<crate::error::RuleRejection>,
    subsumed: Vec<Subsumption>,
    stats: RuleStoreStats,
}

/// 命令执行器
pub struct CommandRunner {
    config: AppConfig,
}

impl CommandRunner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 执行 rank 命令
    pub async fn run_rank(
        &self,
        rules: &Path,
        input: &Path,
        limit: Option<usize>,
        reject_invalid: bool,
    ) -> Result<()> {
        let outcome = self.rank_files(rules, input, limit, reject_invalid).await?;

        info!(
            ranked = outcome.ranking.len(),
            rejected = outcome.rejected_rules.len(),
            "排序完成"
        );
        print_json(&outcome)
    }

    /// 加载规则文件与输入文件并排序
    ///
    /// 加载阶段发现的非法规则同样受拒绝策略约束：
    /// 拒绝策略下整次调用失败，跳过策略下并入 `rejected_rules`。
    pub async fn rank_files(
        &self,
        rules: &Path,
        input: &Path,
        limit: Option<usize>,
        reject_invalid: bool,
    ) -> Result<RankingOutcome> {
        let (store, load) = self.load_store_with_report(rules)?;
        let provider = self.load_input(input)?;

        let mut ranking = self.config.ranking.clone();
        if limit.is_some() {
            ranking.limit = limit;
        }
        if reject_invalid {
            ranking.invalid_rule_policy = InvalidRulePolicy::Reject;
        }

        for rejection in &load.rejected {
            record_rule_rejected(rejection.code);
        }
        if ranking.invalid_rule_policy == InvalidRulePolicy::Reject {
            if let Some(rejection) = load.rejected.first() {
                bail!(
                    "规则 {} 非法 [{}]: {}",
                    rejection.rule_id,
                    rejection.code,
                    rejection.reason
                );
            }
        }

        let service = RankingService::from_config(Arc::new(store), Arc::new(provider), &ranking);
        let mut outcome = service.rank().await.context("排序失败")?;

        // 加载阶段的拒绝在前，编译与评估阶段的在后
        let mut rejected = load.rejected;
        rejected.append(&mut outcome.rejected_rules);
        outcome.rejected_rules = rejected;
        Ok(outcome)
    }

    /// 执行 validate 命令
    pub async fn run_validate(&self, rules: &Path, input: Option<&Path>) -> Result<()> {
        let (store, load) = self.load_store_with_report(rules)?;
        let snapshot = store.snapshot();
        let loaded: Vec<&Rule> = snapshot.values().map(|r| r.as_ref()).collect();

        let schema_rejected = match input {
            Some(path) => {
                let provider = self.load_input(path)?;
                let subject = provider.subject().await?;
                let candidates = provider.candidates().await?;
                let subject_schema = provider
                    .subject_schema()
                    .await?
                    .unwrap_or_else(|| RecordSchema::infer(std::iter::once(&subject)));
                let candidate_schema = provider.candidate_schema().await?.unwrap_or_else(|| {
                    RecordSchema::infer(candidates.iter().map(Candidate::record))
                });

                RankingEngine::new(RankingOptions::from(&self.config.ranking)).check_rules(
                    &loaded,
                    &subject_schema,
                    &candidate_schema,
                )
            }
            None => Vec::new(),
        };

        let subsumed = loaded
            .iter()
            .flat_map(|specific| {
                loaded
                    .iter()
                    .filter(move |general| specific.is_more_specific_than(general))
                    .map(move |general| Subsumption {
                        specific: specific.id().to_string(),
                        general: general.id().to_string(),
                    })
            })
            .collect();

        let invalid = load.rejected.len() + schema_rejected.len();
        print_json(&ValidationReport {
            load,
            schema_rejected,
            subsumed,
            stats: store.stats(),
        })?;

        if invalid > 0 {
            bail!("{} 条规则非法", invalid);
        }
        Ok(())
    }

    /// 执行 rules 命令
    pub async fn run_rules(
        &self,
        rules: &Path,
        target: Option<i64>,
        offset: usize,
        limit: usize,
    ) -> Result<()> {
        let store = self.load_store(rules)?;

        let page = match target {
            Some(target_value) => store.rules_by_target(target_value, offset, limit).await?,
            None => store
                .list_rules()
                .await?
                .into_iter()
                .skip(offset)
                .take(limit)
                .collect(),
        };

        let listing: Vec<RuleListing> = page.iter().map(|r| RuleListing::from(r.as_ref())).collect();
        print_json(&listing)
    }

    /// 执行 targets 命令
    pub async fn run_targets(&self, rules: &Path, max_rules: usize) -> Result<()> {
        let store = self.load_store(rules)?;
        let targets = store.targets_with_at_most(max_rules).await?;
        print_json(&targets)
    }

    fn load_store(&self, path: &Path) -> Result<RuleStore> {
        let (store, report) = self.load_store_with_report(path)?;
        for rejection in &report.rejected {
            warn!(
                rule_id = %rejection.rule_id,
                code = rejection.code,
                "跳过无法加载的规则: {}",
                rejection.reason
            );
        }
        Ok(store)
    }

    fn load_store_with_report(&self, path: &Path) -> Result<(RuleStore, LoadReport)> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("读取规则文件失败: {}", path.display()))?;

        let store = RuleStore::new();
        let report = store
            .load_from_json(&json)
            .with_context(|| format!("解析规则文件失败: {}", path.display()))?;

        info!(
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            "规则文件已加载"
        );
        Ok((store, report))
    }

    fn load_input(&self, path: &Path) -> Result<StaticRecordProvider> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("读取输入文件失败: {}", path.display()))?;

        RecordDecoder::new(self.config.candidate_fields.clone())
            .decode_input(&json)
            .with_context(|| format!("解析输入文件失败: {}", path.display()))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const INPUT: &str = r#"{
        "subject": {"rewatched": 1},
        "candidates": [
            {"anime_id": 1, "name": "Cowboy Bebop", "score": 8.75},
            {"anime_id": 2, "name": "Naruto", "score": 8.0}
        ]
    }"#;

    const RULES: &str = r#"[
        {
            "rule_id": "good",
            "target_value": 1,
            "conditions": [
                {"scope": "candidate", "field": "score", "operator": ">=", "value_numeric": 8.5}
            ]
        },
        {
            "rule_id": "bad",
            "target_value": 2,
            "conditions": [
                {"scope": "candidate", "field": "score", "operator": "in", "value_numeric": 8}
            ]
        }
    ]"#;

    fn write_files(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "ranker-cli-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let rules = dir.join("rules.json");
        let input = dir.join("input.json");
        fs::write(&rules, RULES).unwrap();
        fs::write(&input, INPUT).unwrap();
        (rules, input)
    }

    #[tokio::test]
    async fn test_load_rejections_reported_when_skipping() {
        let (rules, input) = write_files("skip");
        let runner = CommandRunner::new(AppConfig::default());

        let outcome = runner.rank_files(&rules, &input, None, false).await.unwrap();

        assert_eq!(outcome.ranking.len(), 1);
        assert_eq!(outcome.ranking[0].candidate_id, 1);
        assert_eq!(outcome.rejected_rules.len(), 1);
        assert_eq!(outcome.rejected_rules[0].rule_id, "bad");
        assert_eq!(outcome.rejected_rules[0].code, "UNKNOWN_OPERATOR");
    }

    #[tokio::test]
    async fn test_load_rejections_fail_call_when_rejecting() {
        let (rules, input) = write_files("reject");
        let runner = CommandRunner::new(AppConfig::default());

        let err = runner.rank_files(&rules, &input, None, true).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bad"));
        assert!(message.contains("UNKNOWN_OPERATOR"));

        // 配置中的拒绝策略同样生效
        let mut config = AppConfig::default();
        config.ranking.invalid_rule_policy = InvalidRulePolicy::Reject;
        assert!(CommandRunner::new(config)
            .rank_files(&rules, &input, None, false)
            .await
            .is_err());
    }
}
