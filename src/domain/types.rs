// ==========================================
// 表格批量导入服务 - 领域类型定义
// ==========================================
// 职责: 导入任务类型、单元格值、行状态、编排状态
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入任务类型 (Job Kind)
// ==========================================
// 决定身份字段、关联校验规则与落库表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sales,           // 销售数据（门店 + 品牌）
    StoreAssignment, // 门店分配（门店 + 品牌 + 品类）
}

impl JobKind {
    /// 该任务类型要求的身份字段（按校验顺序）
    pub fn identity_fields(&self) -> &'static [&'static str] {
        match self {
            JobKind::Sales => &[STORE_CODE_FIELD, BRAND_CODE_FIELD],
            JobKind::StoreAssignment => &[STORE_CODE_FIELD, BRAND_CODE_FIELD, CATEGORY_CODE_FIELD],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Sales => "sales",
            JobKind::StoreAssignment => "store_assignment",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sales" => Ok(JobKind::Sales),
            "store_assignment" | "assignment" | "store" => Ok(JobKind::StoreAssignment),
            other => Err(format!("unknown import kind: {}", other)),
        }
    }
}

// ==========================================
// 身份字段名（表头原样保留，不拼接子表头）
// ==========================================
pub const STORE_CODE_FIELD: &str = "Store Code";
pub const BRAND_CODE_FIELD: &str = "Brand Code";
pub const CATEGORY_CODE_FIELD: &str = "Category Code";

/// 所有身份字段（解析器据此判断是否原样保留表头）
pub const IDENTITY_FIELDS: [&str; 3] = [STORE_CODE_FIELD, BRAND_CODE_FIELD, CATEGORY_CODE_FIELD];

/// 判断表头是否为身份字段（忽略大小写与首尾空白）
pub fn identity_field_name(header: &str) -> Option<&'static str> {
    let trimmed = header.trim();
    IDENTITY_FIELDS
        .iter()
        .copied()
        .find(|f| f.eq_ignore_ascii_case(trimmed))
}

// ==========================================
// 单元格值 (Cell Value)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    /// 以文本形式读取（数字去掉多余的 .0）
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::Date(d) => d.format("%d-%m-%Y").to_string(),
        }
    }

    /// 以数值形式读取（文本允许千分位逗号）
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Number(_) => None,
            CellValue::Text(s) => {
                let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
                if cleaned.is_empty() {
                    return None;
                }
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            CellValue::Date(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }
}

// ==========================================
// 行状态 (Row Status)
// ==========================================
// 序列化格式: 小写 (与前端协议一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Error,
}

// ==========================================
// 编排状态机 (Import State)
// ==========================================
// Init → CacheReady → Parsing → Validating → Committing → Done
// 任意状态遇到致命错误 → Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Init,
    CacheReady,
    Parsing,
    Validating,
    Committing,
    Done,
    Failed,
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Done | ImportState::Failed)
    }

    /// 合法的下一状态（严格顺序推进）
    pub fn can_transition_to(&self, next: ImportState) -> bool {
        use ImportState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Init, CacheReady)
            | (CacheReady, Parsing)
            | (Parsing, Validating)
            | (Validating, Committing)
            | (Committing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportState::Init => "init",
            ImportState::CacheReady => "cache_ready",
            ImportState::Parsing => "parsing",
            ImportState::Validating => "validating",
            ImportState::Committing => "committing",
            ImportState::Done => "done",
            ImportState::Failed => "failed",
        };
        f.write_str(s)
    }
}
