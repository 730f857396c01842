//! 类型化记录
//!
//! 主体档案与候选记录都是 字段名 → 类型化取值 的映射。
//! 条件评估器通过 [`FieldAccessor`] 读取字段，按取值类型分派，不在评估逻辑中探测 JSON 类型。

use crate::error::{RankingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 字段声明类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Text,
    TextSet,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::TextSet => "text_set",
        };
        f.write_str(s)
    }
}

/// 字段取值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Numeric(f64),
    Text(String),
    TextSet(BTreeSet<String>),
}

impl FieldValue {
    /// 由字符串集合构造
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::TextSet(items.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Numeric(_) => FieldKind::Numeric,
            Self::Text(_) => FieldKind::Text,
            Self::TextSet(_) => FieldKind::TextSet,
        }
    }

    /// 数值强制转换：数值本身，或可解析为有限数值的文本
    ///
    /// `"NaN"`、`"inf"` 之类的文本不视为数值。
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::TextSet(_) => None,
        }
    }

    /// 从 JSON 值转换，`null` 表示字段缺失
    pub fn from_json(field: &str, value: &Value) -> Result<Option<Self>> {
        let converted = match value {
            Value::Null => return Ok(None),
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => Self::Numeric(n.as_f64().ok_or_else(|| {
                RankingError::InvalidRecord(format!("字段 {} 的数值无法表示: {}", field, n))
            })?),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    match item {
                        Value::Null => {}
                        Value::String(s) => {
                            set.insert(s.clone());
                        }
                        Value::Number(n) => {
                            set.insert(n.to_string());
                        }
                        Value::Bool(b) => {
                            set.insert(b.to_string());
                        }
                        _ => {
                            return Err(RankingError::InvalidRecord(format!(
                                "字段 {} 的集合元素必须是标量",
                                field
                            )));
                        }
                    }
                }
                Self::TextSet(set)
            }
            Value::Object(_) => {
                return Err(RankingError::InvalidRecord(format!(
                    "字段 {} 不支持嵌套对象",
                    field
                )));
            }
        };

        Ok(Some(converted))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Numeric(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// 类型化字段访问
pub trait FieldAccessor {
    /// 读取字段，缺失时返回 `None`
    fn field(&self, name: &str) -> Option<&FieldValue>;
}

/// 扁平记录（主体档案即一条记录）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

/// 主体档案
pub type Subject = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式添加字段
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从 JSON 对象构造，`null` 字段视为缺失
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RankingError::InvalidRecord("记录必须是 JSON 对象".to_string())
        })?;

        let mut record = Self::new();
        for (name, raw) in object {
            if let Some(field) = FieldValue::from_json(name, raw)? {
                record.fields.insert(name.clone(), field);
            }
        }

        Ok(record)
    }
}

impl FieldAccessor for Record {
    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.get(name)
    }
}

/// 候选记录
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    id: i64,
    name: String,
    alt_name: Option<String>,
    record: Record,
}

impl Candidate {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            alt_name: None,
            record: Record::new(),
        }
    }

    /// 设置备选（本地化）名称
    pub fn with_alt_name(mut self, alt_name: impl Into<String>) -> Self {
        self.alt_name = Some(alt_name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.record.insert(name, value);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = record;
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alt_name(&self) -> Option<&str> {
        self.alt_name.as_deref()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// 显示名称：备选名称存在且非空时优先，否则使用主名称
    pub fn display_name(&self) -> &str {
        match self.alt_name.as_deref() {
            Some(alt) if !alt.trim().is_empty() => alt,
            _ => &self.name,
        }
    }
}

impl FieldAccessor for Candidate {
    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.record.get(name)
    }
}

/// 记录结构：字段名 → 声明类型
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSchema {
    fields: BTreeMap<String, FieldKind>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式声明字段
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 从一批记录推断结构
    ///
    /// 字段在任一记录中出现即可解析；出现的取值都是集合时为 `TextSet`，
    /// 至少一个取值可转为数值时为 `Numeric`，其余为 `Text`。
    /// 个别记录中无法转换的取值留到评估时作为 `TypeMismatch` 处理。
    pub fn infer<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        // (存在可转数值的取值, 全部为集合)
        let mut seen: BTreeMap<&'a str, (bool, bool)> = BTreeMap::new();

        for record in records {
            for (name, value) in record.iter() {
                let entry = seen.entry(name).or_insert((false, true));
                entry.0 |= value.as_number().is_some();
                entry.1 &= matches!(value, FieldValue::TextSet(_));
            }
        }

        let fields = seen
            .into_iter()
            .map(|(name, (numeric, set))| {
                let kind = if set {
                    FieldKind::TextSet
                } else if numeric {
                    FieldKind::Numeric
                } else {
                    FieldKind::Text
                };
                (name.to_string(), kind)
            })
            .collect();

        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_json() {
        let record = Record::from_json(&json!({
            "rewatched": 2,
            "gender": "Female",
            "genres": ["Drama", "Romance", null],
            "aired": null,
            "kids": false
        }))
        .unwrap();

        assert_eq!(record.get("rewatched"), Some(&FieldValue::Numeric(2.0)));
        assert_eq!(record.get("gender"), Some(&FieldValue::from("Female")));
        assert_eq!(
            record.get("genres"),
            Some(&FieldValue::set(["Drama", "Romance"]))
        );
        assert_eq!(record.get("aired"), None);
        assert_eq!(record.get("kids"), Some(&FieldValue::from("false")));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_record_rejects_nested_objects() {
        let err = Record::from_json(&json!({"studio": {"name": "Bones"}})).unwrap_err();
        assert_eq!(err.code(), "INVALID_RECORD");

        let err = Record::from_json(&json!(["not", "an", "object"])).unwrap_err();
        assert_eq!(err.code(), "INVALID_RECORD");
    }

    #[test]
    fn test_as_number() {
        assert_eq!(FieldValue::from(7_i64).as_number(), Some(7.0));
        assert_eq!(FieldValue::from(" 8.5 ").as_number(), Some(8.5));
        assert_eq!(FieldValue::from("TV").as_number(), None);
        assert_eq!(FieldValue::set(["1"]).as_number(), None);
    }

    #[test]
    fn test_non_finite_text_is_not_numeric() {
        for text in ["NaN", "nan", "inf", "-inf", "infinity"] {
            assert_eq!(FieldValue::from(text).as_number(), None, "{}", text);
        }

        let records = [Record::new().with("rating", "NaN"), Record::new().with("rating", "inf")];
        let schema = RecordSchema::infer(records.iter());
        assert_eq!(schema.kind_of("rating"), Some(FieldKind::Text));
    }

    #[test]
    fn test_display_name_fallback() {
        let plain = Candidate::new(1, "Shingeki no Kyojin");
        assert_eq!(plain.display_name(), "Shingeki no Kyojin");

        let localized = plain.clone().with_alt_name("Attack on Titan");
        assert_eq!(localized.display_name(), "Attack on Titan");

        let blank = plain.with_alt_name("  ");
        assert_eq!(blank.display_name(), "Shingeki no Kyojin");
    }

    #[test]
    fn test_candidate_field_access() {
        let candidate = Candidate::new(1, "Monster")
            .with_field("source", "Manga")
            .with_field("genres", FieldValue::set(["Drama", "Mystery"]));

        assert_eq!(candidate.field("source"), Some(&FieldValue::from("Manga")));
        assert!(candidate.field("episodes").is_none());
    }

    #[test]
    fn test_infer_schema() {
        let records = [
            Record::new()
                .with("score", 8.1)
                .with("year", "2004")
                .with("source", "Manga")
                .with("genres", FieldValue::set(["Drama"])),
            Record::new()
                .with("score", 7.0)
                .with("source", "Original")
                .with("genres", FieldValue::set(Vec::<String>::new())),
        ];

        let schema = RecordSchema::infer(records.iter());

        assert_eq!(schema.kind_of("score"), Some(FieldKind::Numeric));
        assert_eq!(schema.kind_of("year"), Some(FieldKind::Numeric));
        assert_eq!(schema.kind_of("source"), Some(FieldKind::Text));
        assert_eq!(schema.kind_of("genres"), Some(FieldKind::TextSet));
        assert_eq!(schema.kind_of("episodes"), None);
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn test_infer_stray_value_keeps_numeric_kind() {
        let mut records: Vec<Record> = (0..999).map(|_| Record::new().with("score", 9.0)).collect();
        records.push(Record::new().with("score", "n/a"));
        records.push(Record::new().with("aired", "n/a"));

        let schema = RecordSchema::infer(records.iter());

        assert_eq!(schema.kind_of("score"), Some(FieldKind::Numeric));
        assert_eq!(schema.kind_of("aired"), Some(FieldKind::Text));
    }

    #[test]
    fn test_schema_deserialization() {
        let schema: RecordSchema =
            serde_json::from_value(json!({"rewatched": "numeric", "genres": "text_set"}))
                .unwrap();

        assert_eq!(schema.kind_of("rewatched"), Some(FieldKind::Numeric));
        assert_eq!(schema.kind_of("genres"), Some(FieldKind::TextSet));
    }
}
