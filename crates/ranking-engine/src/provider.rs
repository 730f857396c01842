//! 主体与候选数据提供方
//!
//! 排序开始前一次性取齐主体档案与候选列表。

use crate::error::{RankingError, Result};
use crate::record::{Candidate, Record, RecordSchema, Subject};
use async_trait::async_trait;
use ranker_shared::config::CandidateFieldsConfig;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// 数据提供方接口
#[async_trait]
pub trait RecordProvider: Send + Sync {
    /// 主体档案
    async fn subject(&self) -> Result<Subject>;

    /// 候选列表（保持输入顺序）
    async fn candidates(&self) -> Result<Vec<Candidate>>;

    /// 声明的主体字段结构，未声明时从记录推断
    async fn subject_schema(&self) -> Result<Option<RecordSchema>> {
        Ok(None)
    }

    /// 声明的候选字段结构，未声明时从记录推断
    async fn candidate_schema(&self) -> Result<Option<RecordSchema>> {
        Ok(None)
    }
}

/// 持有已解码数据的提供方
#[derive(Debug, Clone, Default)]
pub struct StaticRecordProvider {
    subject: Subject,
    candidates: Vec<Candidate>,
    subject_schema: Option<RecordSchema>,
    candidate_schema: Option<RecordSchema>,
}

impl StaticRecordProvider {
    pub fn new(subject: Subject, candidates: Vec<Candidate>) -> Self {
        Self {
            subject,
            candidates,
            subject_schema: None,
            candidate_schema: None,
        }
    }

    pub fn with_subject_schema(mut self, schema: RecordSchema) -> Self {
        self.subject_schema = Some(schema);
        self
    }

    pub fn with_candidate_schema(mut self, schema: RecordSchema) -> Self {
        self.candidate_schema = Some(schema);
        self
    }
}

#[async_trait]
impl RecordProvider for StaticRecordProvider {
    async fn subject(&self) -> Result<Subject> {
        Ok(self.subject.clone())
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }

    async fn subject_schema(&self) -> Result<Option<RecordSchema>> {
        Ok(self.subject_schema.clone())
    }

    async fn candidate_schema(&self) -> Result<Option<RecordSchema>> {
        Ok(self.candidate_schema.clone())
    }
}

/// 输入文件格式
#[derive(Debug, Deserialize)]
struct RawInput {
    subject: Value,
    #[serde(default)]
    candidates: Vec<Value>,
    #[serde(default)]
    subject_schema: Option<RecordSchema>,
    #[serde(default)]
    candidate_schema: Option<RecordSchema>,
}

/// JSON → 类型化记录的解码器
#[derive(Debug, Clone, Default)]
pub struct RecordDecoder {
    fields: CandidateFieldsConfig,
}

impl RecordDecoder {
    pub fn new(fields: CandidateFieldsConfig) -> Self {
        Self { fields }
    }

    pub fn decode_subject(&self, value: &Value) -> Result<Subject> {
        Record::from_json(value)
    }

    /// 解码单个候选
    ///
    /// 标识取第一个存在的标识字段；名称缺失时以标识代替。
    pub fn decode_candidate(&self, value: &Value) -> Result<Candidate> {
        let record = Record::from_json(value)?;

        let id = self
            .fields
            .id_fields
            .iter()
            .find_map(|field| value.get(field).filter(|v| !v.is_null()).map(|v| (field, v)))
            .ok_or_else(|| {
                RankingError::InvalidRecord(format!(
                    "候选缺少标识字段: {}",
                    self.fields.id_fields.join(" / ")
                ))
            })
            .and_then(|(field, v)| parse_id(field, v))?;

        let name = value
            .get(&self.fields.name_field)
            .and_then(scalar_to_string)
            .unwrap_or_else(|| id.to_string());

        let mut candidate = Candidate::new(id, name).with_record(record);
        if let Some(alt) = value
            .get(&self.fields.alt_name_field)
            .and_then(scalar_to_string)
        {
            candidate = candidate.with_alt_name(alt);
        }

        Ok(candidate)
    }

    pub fn decode_candidates(&self, values: &[Value]) -> Result<Vec<Candidate>> {
        values.iter().map(|v| self.decode_candidate(v)).collect()
    }

    /// 解码完整输入 `{"subject": {...}, "candidates": [...]}`
    pub fn decode_input(&self, json: &str) -> Result<StaticRecordProvider> {
        let raw: RawInput = serde_json::from_str(json)?;

        let subject = self.decode_subject(&raw.subject)?;
        let candidates = self.decode_candidates(&raw.candidates)?;
        debug!(
            subject_fields = subject.len(),
            candidates = candidates.len(),
            "输入已解码"
        );

        let mut provider = StaticRecordProvider::new(subject, candidates);
        if let Some(schema) = raw.subject_schema {
            provider = provider.with_subject_schema(schema);
        }
        if let Some(schema) = raw.candidate_schema {
            provider = provider.with_candidate_schema(schema);
        }

        Ok(provider)
    }
}

fn parse_id(field: &str, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        RankingError::InvalidRecord(format!("候选标识 {} 不是整数: {}", field, value))
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
