//! 条件操作符与作用域定义

use crate::error::RankingError;
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    // 通用比较（数值相等、字符串相等或集合成员）
    Eq,
    Neq,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    /// 规范化后的记号
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// 是否只能用于数值比较
    pub fn is_numeric_only(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

impl FromStr for Operator {
    type Err = RankingError;

    /// `=` 与 `==` 视为同义
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Neq),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            other => Err(RankingError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// 条件作用域：条件针对主体档案还是候选记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Subject,
    Candidate,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Candidate => "candidate",
        }
    }
}

impl FromStr for Scope {
    type Err = RankingError;

    /// 兼容存储层的旧表名：user_details / anime_dataset
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "subject" | "user_details" => Ok(Self::Subject),
            "candidate" | "anime_dataset" => Ok(Self::Candidate),
            other => Err(RankingError::UnknownScope(other.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
