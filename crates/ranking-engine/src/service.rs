//! 排序服务
//!
//! 先从规则仓储与数据提供方取齐数据，再交给排序引擎计算。
//! 可选的超时覆盖整个取数与排序过程，超时后不返回任何部分结果。

use crate::error::{RankingError, Result};
use crate::provider::RecordProvider;
use crate::ranking::{RankingEngine, RankingOptions, RankingOutcome};
use crate::record::{Candidate, RecordSchema};
use crate::store::RuleRepository;
use ranker_shared::config::RankingConfig;
use ranker_shared::observability::metrics::record_ranking;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// 排序服务
pub struct RankingService<R: ?Sized, P: ?Sized> {
    repository: Arc<R>,
    provider: Arc<P>,
    engine: RankingEngine,
    timeout: Option<Duration>,
}

impl<R, P> RankingService<R, P>
where
    R: RuleRepository + ?Sized,
    P: RecordProvider + ?Sized,
{
    pub fn new(repository: Arc<R>, provider: Arc<P>, engine: RankingEngine) -> Self {
        Self {
            repository,
            provider,
            engine,
            timeout: None,
        }
    }

    /// 按配置创建（策略、top-N 与超时）
    pub fn from_config(repository: Arc<R>, provider: Arc<P>, config: &RankingConfig) -> Self {
        let service = Self::new(
            repository,
            provider,
            RankingEngine::new(RankingOptions::from(config)),
        );

        match config.timeout_ms {
            Some(ms) => service.with_timeout(Duration::from_millis(ms)),
            None => service,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    /// 执行一次排序
    #[instrument(skip(self), fields(timeout_ms = self.timeout.map(|t| t.as_millis() as u64)))]
    pub async fn rank(&self) -> Result<RankingOutcome> {
        let Some(limit) = self.timeout else {
            return self.fetch_and_rank(None).await;
        };

        // 取数阶段由 tokio 计时器中断，排序阶段由引擎按截止时间检查
        let deadline = Instant::now() + limit;
        match tokio::time::timeout(limit, self.fetch_and_rank(Some(deadline))).await {
            Ok(Err(RankingError::Timeout(_))) => {
                let ms = limit.as_millis() as u64;
                warn!(timeout_ms = ms, "排序超时，丢弃本次结果");
                Err(RankingError::Timeout(ms))
            }
            Ok(result) => result,
            Err(_) => {
                let ms = limit.as_millis() as u64;
                warn!(timeout_ms = ms, "排序超时，丢弃本次结果");
                record_ranking("timeout", 0, limit.as_secs_f64());
                Err(RankingError::Timeout(ms))
            }
        }
    }

    async fn fetch_and_rank(&self, deadline: Option<Instant>) -> Result<RankingOutcome> {
        let rules = self.repository.list_rules().await?;
        let subject = self.provider.subject().await?;
        let candidates = self.provider.candidates().await?;
        debug!(
            rules = rules.len(),
            candidates = candidates.len(),
            "数据已取齐"
        );

        let subject_schema = match self.provider.subject_schema().await? {
            Some(schema) => schema,
            None => RecordSchema::infer(std::iter::once(&subject)),
        };
        let candidate_schema = match self.provider.candidate_schema().await? {
            Some(schema) => schema,
            None => RecordSchema::infer(candidates.iter().map(Candidate::record)),
        };

        match deadline {
            Some(deadline) => self.engine.rank_with_deadline(
                &rules,
                &subject,
                &candidates,
                &subject_schema,
                &candidate_schema,
                deadline,
            ),
            None => self.engine.rank_with_schemas(
                &rules,
                &subject,
                &candidates,
                &subject_schema,
                &candidate_schema,
            ),
        }
    }
}
