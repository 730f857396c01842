//! 规则存储
//!
//! 内存规则存储，同时实现 [`RuleRepository`] 供排序服务读取。
//!
//! 读取端通过 `ArcSwap` 一次原子 load 拿到完整快照，一次排序调用始终看到一致的规则集；
//! 写入端在互斥锁内复制当前映射、修改后整体发布。

use crate::error::{RankingError, Result, RuleRejection};
use crate::models::{Condition, ConditionRow, Rule, RuleRow};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 规则快照：规则 ID → 规则
pub type RuleSnapshot = BTreeMap<String, Arc<Rule>>;

/// 规则仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// 所有规则（按规则 ID 排序）
    async fn list_rules(&self) -> Result<Vec<Arc<Rule>>>;

    /// 指定规则的条件
    async fn list_conditions(&self, rule_id: &str) -> Result<Vec<Condition>>;

    /// 按目标值分页查询规则
    async fn rules_by_target(
        &self,
        target_value: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Arc<Rule>>>;

    /// 规则数不超过 `max_rules` 的目标值
    async fn targets_with_at_most(&self, max_rules: usize) -> Result<Vec<i64>>;
}

/// 批量加载结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<RuleRejection>,
}

impl LoadReport {
    fn reject(&mut self, rule_id: impl Into<String>, err: &RankingError) {
        let rule_id = rule_id.into();
        warn!(rule_id = %rule_id, error = %err, "规则加载失败");
        self.rejected.push(RuleRejection::new(rule_id, err));
    }
}

/// 规则文件中的一项，条件保持存储行形态
#[derive(Deserialize)]
struct RuleDocument {
    #[serde(default, alias = "id")]
    rule_id: Option<String>,
    target_value: i64,
    #[serde(default)]
    conditions: Vec<ConditionRow>,
}

impl RuleDocument {
    fn into_rule(self) -> Result<Rule> {
        let conditions = self
            .conditions
            .into_iter()
            .map(Condition::try_from)
            .collect::<Result<Vec<_>>>()?;

        match self.rule_id {
            Some(rule_id) => Rule::with_id(rule_id, self.target_value, conditions),
            None => Ok(Rule::new(self.target_value, conditions)),
        }
    }
}

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    rules: Arc<ArcSwap<RuleSnapshot>>,
    /// 写入端互斥
    write_lock: Arc<Mutex<()>>,
}

impl RuleStore {
    /// 创建新的规则存储
    pub fn new() -> Self {
        Self {
            rules: Arc::new(ArcSwap::from_pointee(BTreeMap::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 获取当前存储的规则数量
    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }

    /// 当前规则快照
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.rules.load_full()
    }

    /// 复制当前映射，修改成功后整体发布
    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RuleSnapshot) -> Result<T>,
    {
        let _guard = self.write_lock.lock();
        let mut next = RuleSnapshot::clone(&self.rules.load_full());
        let out = f(&mut next)?;
        self.rules.store(Arc::new(next));
        Ok(out)
    }

    /// 复制当前映射，批量修改后发布一次
    fn modify_all<F>(&self, f: F)
    where
        F: FnOnce(&mut RuleSnapshot),
    {
        let _guard = self.write_lock.lock();
        let mut next = RuleSnapshot::clone(&self.rules.load_full());
        f(&mut next);
        self.rules.store(Arc::new(next));
    }

    /// 插入规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id(), target_value = rule.target_value()))]
    pub fn insert(&self, rule: Rule) -> Result<()> {
        let rule_id = rule.id().to_string();

        self.modify(|rules| {
            if rules.contains_key(&rule_id) {
                return Err(RankingError::DuplicateRule(rule_id.clone()));
            }
            rules.insert(rule_id.clone(), Arc::new(rule));
            Ok(())
        })?;

        info!("规则已加载: {}", rule_id);
        Ok(())
    }

    /// 批量插入，单条失败不影响其他规则
    ///
    /// 整批在一次复制内完成并只发布一次快照。
    #[instrument(skip(self, rules), fields(count = rules.len()))]
    pub fn insert_batch(&self, rules: Vec<Rule>) -> LoadReport {
        let mut report = LoadReport::default();

        self.modify_all(|snapshot| {
            for rule in rules {
                let rule_id = rule.id().to_string();
                if snapshot.contains_key(&rule_id) {
                    report.reject(rule_id.clone(), &RankingError::DuplicateRule(rule_id));
                    continue;
                }
                debug!("规则已加载: {}", rule_id);
                snapshot.insert(rule_id.clone(), Arc::new(rule));
                report.loaded.push(rule_id);
            }
        });

        info!(
            "批量加载完成: {} 成功, {} 失败",
            report.loaded.len(),
            report.rejected.len()
        );
        report
    }

    /// 从 JSON 数组加载规则
    ///
    /// 整体不是 JSON 数组时返回错误；单条规则格式错误只记入 `rejected`。
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<LoadReport> {
        let items: Vec<Value> = serde_json::from_str(json)?;
        let mut rules = Vec::with_capacity(items.len());
        let mut report = LoadReport::default();

        for (index, item) in items.into_iter().enumerate() {
            let label = item
                .get("rule_id")
                .or_else(|| item.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index));

            // 先按行形态解析，条件校验错误保留原始错误码
            let built = serde_json::from_value::<RuleDocument>(item)
                .map_err(RankingError::from)
                .and_then(RuleDocument::into_rule);
            match built {
                Ok(rule) => rules.push(rule),
                Err(e) => report.reject(label, &e),
            }
        }

        let inserted = self.insert_batch(rules);
        report.loaded = inserted.loaded;
        report.rejected.extend(inserted.rejected);
        Ok(report)
    }

    /// 从存储行加载规则
    ///
    /// 条件行按 `rule_id` 归组；引用不存在规则的条件行被拒绝，
    /// 任一条件行非法时整条规则被拒绝。
    #[instrument(skip_all, fields(rules = rule_rows.len(), conditions = condition_rows.len()))]
    pub fn load_rows(
        &self,
        rule_rows: Vec<RuleRow>,
        condition_rows: Vec<ConditionRow>,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        let mut order = Vec::with_capacity(rule_rows.len());
        let mut grouped: HashMap<String, (i64, Vec<ConditionRow>)> = HashMap::new();

        for row in rule_rows {
            if grouped.contains_key(&row.rule_id) {
                let err = RankingError::DuplicateRule(row.rule_id.clone());
                report.reject(row.rule_id, &err);
                continue;
            }
            order.push(row.rule_id.clone());
            grouped.insert(row.rule_id, (row.target_value, Vec::new()));
        }

        for row in condition_rows {
            match row.rule_id.as_deref().and_then(|id| grouped.get_mut(id)) {
                Some((_, rows)) => rows.push(row),
                None => {
                    let rule_id = row.rule_id.clone().unwrap_or_default();
                    let err = RankingError::OrphanCondition {
                        condition_id: row.condition_id.clone().unwrap_or_default(),
                        rule_id: rule_id.clone(),
                    };
                    report.reject(rule_id, &err);
                }
            }
        }

        let mut rules = Vec::with_capacity(order.len());
        for rule_id in order {
            let Some((target_value, rows)) = grouped.remove(&rule_id) else {
                continue;
            };

            let built = rows
                .into_iter()
                .map(Condition::try_from)
                .collect::<Result<Vec<_>>>()
                .and_then(|conditions| Rule::with_id(rule_id.clone(), target_value, conditions));

            match built {
                Ok(rule) => rules.push(rule),
                Err(e) => report.reject(rule_id, &e),
            }
        }

        let inserted = self.insert_batch(rules);
        report.loaded = inserted.loaded;
        report.rejected.extend(inserted.rejected);
        report
    }

    /// 更新规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id()))]
    pub fn update(&self, rule: Rule) -> Result<()> {
        let rule_id = rule.id().to_string();

        self.modify(|rules| match rules.get_mut(&rule_id) {
            Some(slot) => {
                *slot = Arc::new(rule);
                Ok(())
            }
            None => {
                warn!("更新不存在的规则: {}", rule_id);
                Err(RankingError::RuleNotFound(rule_id.clone()))
            }
        })?;

        info!("规则已更新: {}", rule_id);
        Ok(())
    }

    /// 删除规则（条件随规则一起删除）
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<()> {
        self.modify(|rules| {
            if rules.remove(rule_id).is_some() {
                info!("规则已删除: {}", rule_id);
                Ok(())
            } else {
                warn!("删除不存在的规则: {}", rule_id);
                Err(RankingError::RuleNotFound(rule_id.to_string()))
            }
        })
    }

    /// 获取规则
    pub fn get(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.rules.load().get(rule_id).cloned()
    }

    /// 检查规则是否存在
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.load().contains_key(rule_id)
    }

    /// 获取所有规则 ID（有序）
    pub fn list_ids(&self) -> Vec<String> {
        self.rules.load().keys().cloned().collect()
    }

    /// 清空所有规则
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        let previous = self.rules.swap(Arc::new(BTreeMap::new()));
        info!("已清空 {} 条规则", previous.len());
    }

    /// 获取规则统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let snapshot = self.snapshot();
        let rules_count = snapshot.len();
        let total_conditions: usize = snapshot.values().map(|r| r.condition_count()).sum();
        let targets_count = snapshot
            .values()
            .map(|r| r.target_value())
            .collect::<BTreeSet<_>>()
            .len();

        RuleStoreStats {
            rules_count,
            targets_count,
            total_conditions,
            avg_conditions_per_rule: if rules_count > 0 {
                total_conditions as f64 / rules_count as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleRepository for RuleStore {
    async fn list_rules(&self) -> Result<Vec<Arc<Rule>>> {
        Ok(self.snapshot().values().cloned().collect())
    }

    async fn list_conditions(&self, rule_id: &str) -> Result<Vec<Condition>> {
        self.get(rule_id)
            .map(|rule| rule.conditions().to_vec())
            .ok_or_else(|| RankingError::RuleNotFound(rule_id.to_string()))
    }

    async fn rules_by_target(
        &self,
        target_value: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Arc<Rule>>> {
        Ok(self
            .snapshot()
            .values()
            .filter(|r| r.target_value() == target_value)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn targets_with_at_most(&self, max_rules: usize) -> Result<Vec<i64>> {
        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for rule in self.snapshot().values() {
            *counts.entry(rule.target_value()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count <= max_rules)
            .map(|(target, _)| target)
            .collect())
    }
}

/// 规则存储统计信息
#[derive(Debug, Clone, Serialize)]
pub struct RuleStoreStats {
    /// 规则总数
    pub rules_count: usize,
    /// 不同目标值的数量
    pub targets_count: usize,
    /// 所有规则的条件总数
    pub total_conditions: usize,
    /// 平均每条规则的条件数
    pub avg_conditions_per_rule: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{Operator, Scope};

    fn sample_rule(id: &str, target_value: i64) -> Rule {
        Rule::with_id(
            id,
            target_value,
            vec![
                Condition::numeric(Scope::Subject, "rewatched", Operator::Gte, 0.0).unwrap(),
                Condition::text(Scope::Candidate, "source", Operator::Eq, "Manga").unwrap(),
            ],
        )
        .unwrap()
    }

    fn condition_row(id: &str, rule_id: Option<&str>) -> ConditionRow {
        ConditionRow {
            condition_id: Some(id.to_string()),
            rule_id: rule_id.map(str::to_string),
            scope: "anime_dataset".to_string(),
            field: "source".to_string(),
            operator: "=".to_string(),
            value_text: Some("Manga".to_string()),
            value_numeric: None,
        }
    }

    #[test]
    fn test_insert_rule() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains("rule-001"));
    }

    #[test]
    fn test_insert_duplicate_rule() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        let err = store.insert(sample_rule("rule-001", 2)).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_RULE");
        assert_eq!(store.get("rule-001").unwrap().target_value(), 1);
    }

    #[test]
    fn test_get_nonexistent_rule() {
        let store = RuleStore::new();
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_update_rule() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        store.update(sample_rule("rule-001", 42)).unwrap();

        assert_eq!(store.get("rule-001").unwrap().target_value(), 42);
    }

    #[test]
    fn test_update_nonexistent_rule() {
        let store = RuleStore::new();
        let err = store.update(sample_rule("rule-001", 1)).unwrap_err();
        assert_eq!(err.code(), "RULE_NOT_FOUND");
    }

    #[test]
    fn test_delete_rule() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        store.delete("rule-001").unwrap();

        assert!(!store.contains("rule-001"));
        assert!(store.is_empty());
        assert!(store.delete("rule-001").is_err());
    }

    #[test]
    fn test_list_ids_sorted() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-002", 1)).unwrap();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        assert_eq!(store.list_ids(), vec!["rule-001", "rule-002"]);
    }

    #[test]
    fn test_insert_batch_partial_failure() {
        let store = RuleStore::new();
        let report = store.insert_batch(vec![
            sample_rule("rule-001", 1),
            sample_rule("rule-002", 1),
            sample_rule("rule-001", 3),
        ]);

        assert_eq!(report.loaded, vec!["rule-001", "rule-002"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].code, "DUPLICATE_RULE");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_insert_batch_scales_linearly() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-0", 0)).unwrap();
        let before = store.snapshot();

        let rules: Vec<Rule> = (0..20_000)
            .map(|i| sample_rule(&format!("rule-{}", i), i % 500))
            .collect();

        let start = std::time::Instant::now();
        let report = store.insert_batch(rules);

        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(report.loaded.len(), 19_999);
        assert_eq!(report.rejected[0].rule_id, "rule-0");
        assert_eq!(store.len(), 20_000);
        // 旧快照不受批量写入影响
        assert_eq!(before.len(), 1);
    }

    #[test]
    fn test_load_from_json() {
        let store = RuleStore::new();
        let json = r#"
        [
            {
                "rule_id": "rule-001",
                "target_value": 5114,
                "conditions": [
                    {"scope": "subject", "field": "rewatched", "operator": ">=", "value_numeric": 0},
                    {"scope": "candidate", "field": "genres", "operator": "==", "value_text": "Drama"}
                ]
            },
            {
                "rule_id": "rule-002",
                "target_value": 5114,
                "conditions": [
                    {"scope": "candidate", "field": "score", "operator": "~", "value_numeric": 8}
                ]
            }
        ]
        "#;

        let report = store.load_from_json(json).unwrap();

        assert_eq!(report.loaded, vec!["rule-001"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].rule_id, "rule-002");
        assert_eq!(report.rejected[0].code, "UNKNOWN_OPERATOR");
        assert!(store.contains("rule-001"));
        assert!(!store.contains("rule-002"));
    }

    #[test]
    fn test_load_from_json_not_an_array() {
        let store = RuleStore::new();
        let err = store.load_from_json(r#"{"rule_id": "x"}"#).unwrap_err();
        assert_eq!(err.code(), "JSON_ERROR");
    }

    #[test]
    fn test_load_rows() {
        let store = RuleStore::new();
        let rule_rows = vec![
            RuleRow {
                rule_id: "rule-001".to_string(),
                target_value: 1,
            },
            RuleRow {
                rule_id: "rule-002".to_string(),
                target_value: 2,
            },
        ];
        let mut bad = condition_row("c3", Some("rule-002"));
        bad.value_numeric = Some(1.0);

        let report = store.load_rows(
            rule_rows,
            vec![
                condition_row("c1", Some("rule-001")),
                condition_row("c2", Some("rule-001")),
                bad,
                condition_row("c4", Some("rule-999")),
            ],
        );

        assert_eq!(report.loaded, vec!["rule-001"]);
        let codes: Vec<_> = report.rejected.iter().map(|r| r.code).collect();
        assert!(codes.contains(&"ORPHAN_CONDITION"));
        assert!(codes.contains(&"CONFLICTING_VALUES"));
        assert_eq!(store.get("rule-001").unwrap().condition_count(), 2);
    }

    #[test]
    fn test_clear() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();
        store.insert(sample_rule("rule-002", 1)).unwrap();

        store.clear();

        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();

        let snapshot = store.snapshot();
        store.insert(sample_rule("rule-002", 1)).unwrap();
        store.delete("rule-001").unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("rule-001"));
        assert_eq!(store.list_ids(), vec!["rule-002"]);
    }

    #[test]
    fn test_stats() {
        let store = RuleStore::new();
        store.insert(sample_rule("rule-001", 1)).unwrap();
        store.insert(sample_rule("rule-002", 2)).unwrap();

        let stats = store.stats();

        assert_eq!(stats.rules_count, 2);
        assert_eq!(stats.targets_count, 2);
        assert_eq!(stats.total_conditions, 4); // 每个规则有 2 个条件
        assert_eq!(stats.avg_conditions_per_rule, 2.0);
    }

    #[tokio::test]
    async fn test_repository_queries() {
        let store = RuleStore::new();
        for (id, target) in [("r1", 10), ("r2", 10), ("r3", 10), ("r4", 20)] {
            store.insert(sample_rule(id, target)).unwrap();
        }

        assert_eq!(store.list_rules().await.unwrap().len(), 4);
        assert_eq!(store.list_conditions("r1").await.unwrap().len(), 2);
        assert_eq!(
            store.list_conditions("missing").await.unwrap_err().code(),
            "RULE_NOT_FOUND"
        );

        let page = store.rules_by_target(10, 1, 5).await.unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);

        assert_eq!(store.targets_with_at_most(1).await.unwrap(), vec![20]);
        assert_eq!(store.targets_with_at_most(3).await.unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone
                    .insert(sample_rule(&format!("rule-{}", i), i))
                    .unwrap();
            }
        });

        for i in 100..200 {
            store.insert(sample_rule(&format!("rule-{}", i), i)).unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 200);
    }
}
