//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 非法规则的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRulePolicy {
    /// 跳过非法规则并记录日志，其余规则照常评估
    #[default]
    Skip,
    /// 任一规则非法即拒绝整个调用
    Reject,
}

/// 字段缺失（稀疏数据）时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// 条件视为不满足
    #[default]
    Unsatisfied,
    /// 作为评估失败上报
    Error,
}

/// 排序引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub invalid_rule_policy: InvalidRulePolicy,
    pub missing_field_policy: MissingFieldPolicy,
    /// 单次调用（取数 + 排序）的超时时间，未设置时不限制
    pub timeout_ms: Option<u64>,
    /// 只输出前 N 个候选
    pub limit: Option<usize>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            invalid_rule_policy: InvalidRulePolicy::Skip,
            missing_field_policy: MissingFieldPolicy::Unsatisfied,
            timeout_ms: None,
            limit: None,
        }
    }
}

/// 候选记录的字段映射
///
/// 候选数据以 JSON 对象提供，这里声明哪些键是标识和名称。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CandidateFieldsConfig {
    /// 依次尝试的标识字段
    pub id_fields: Vec<String>,
    /// 主名称字段
    pub name_field: String,
    /// 备选（本地化）名称字段，存在且非空时优先显示
    pub alt_name_field: String,
}

impl Default for CandidateFieldsConfig {
    fn default() -> Self {
        Self {
            id_fields: vec!["anime_id".to_string(), "id".to_string()],
            name_field: "name".to_string(),
            alt_name_field: "english_name".to_string(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub ranking: RankingConfig,
    pub candidate_fields: CandidateFieldsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RANKER_ 前缀，层级用双下划线，如
    ///    RANKER_RANKING__TIMEOUT_MS -> ranking.timeout_ms）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RANKER_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置（便于测试和命令行覆盖配置目录）
    pub fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("RANKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_config_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ranker-config-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ranking.invalid_rule_policy, InvalidRulePolicy::Skip);
        assert_eq!(
            config.ranking.missing_field_policy,
            MissingFieldPolicy::Unsatisfied
        );
        assert!(config.ranking.timeout_ms.is_none());
        assert_eq!(config.candidate_fields.name_field, "name");
        assert_eq!(config.candidate_fields.alt_name_field, "english_name");
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = temp_config_dir("empty");
        let config = AppConfig::load_from("rule-ranker", "test", &dir).unwrap();

        assert_eq!(config.service_name, "rule-ranker");
        assert_eq!(config.environment, "test");
        assert_eq!(config.candidate_fields.id_fields, vec!["anime_id", "id"]);
        assert!(!config.is_production());
    }

    #[test]
    fn test_layered_files_override_defaults() {
        let dir = temp_config_dir("layered");
        fs::write(
            dir.join("default.toml"),
            r#"
            [ranking]
            invalid_rule_policy = "reject"
            limit = 10
            "#,
        )
        .unwrap();
        fs::write(
            dir.join("rule-ranker.toml"),
            r#"
            [ranking]
            limit = 3
            missing_field_policy = "error"

            [candidate_fields]
            name_field = "title"
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from("rule-ranker", "staging", &dir).unwrap();

        assert_eq!(config.ranking.invalid_rule_policy, InvalidRulePolicy::Reject);
        assert_eq!(config.ranking.missing_field_policy, MissingFieldPolicy::Error);
        assert_eq!(config.ranking.limit, Some(3));
        assert_eq!(config.candidate_fields.name_field, "title");
        // 未覆盖的字段保持默认值
        assert_eq!(config.candidate_fields.alt_name_field, "english_name");

        fs::remove_dir_all(&dir).unwrap();
    }
}
