// ==========================================
// 表格批量导入服务 - 导入领域模型
// ==========================================
// 职责: 导入任务、原始行、校验结果、时间序列、汇总
// 红线: 不含数据访问逻辑
// ==========================================

use crate::domain::types::{CellValue, JobKind};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ==========================================
// ImportJob - 一次导入调用
// ==========================================
// 生命周期: 请求到达时创建，终态事件发出后结束，不落库
#[derive(Clone)]
pub struct ImportJob {
    pub job_id: String,            // 任务 ID（同时作为导入批次 ID）
    pub kind: JobKind,             // 导入类型
    pub file_name: Option<String>, // 上传文件名（用于选择解析器）
    pub content: Vec<u8>,          // 文件内容
    pub started_at: DateTime<Utc>, // 开始时间
}

impl ImportJob {
    pub fn new(kind: JobKind, file_name: Option<String>, content: Vec<u8>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            kind,
            file_name,
            content,
            started_at: Utc::now(),
        }
    }
}

impl fmt::Debug for ImportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportJob")
            .field("job_id", &self.job_id)
            .field("kind", &self.kind)
            .field("file_name", &self.file_name)
            .field("content_len", &self.content.len())
            .field("started_at", &self.started_at)
            .finish()
    }
}

// ==========================================
// RawRow - 解析后的一行
// ==========================================
// 字段名 → 单元格值；校验后即丢弃
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub row_number: usize, // 表格中的行号（从 1 开始，用于定位）
    pub fields: HashMap<String, CellValue>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            fields: HashMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    /// 读取非空文本值
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)
            .map(|v| v.as_text())
            .filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|v| v.is_blank())
    }
}

// ==========================================
// RowIdentity - 行身份字段（用于报告定位）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("store", &self.store_code),
            ("brand", &self.brand_code),
            ("category", &self.category_code),
        ]
        .iter()
        .filter_map(|(label, v)| v.as_ref().map(|v| format!("{}={}", label, v)))
        .collect();
        if parts.is_empty() {
            f.write_str("no identity")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

// ==========================================
// RecordKey - 已解析的实体 ID（自然键的实体部分）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub store_id: i64,
    pub brand_id: i64,
    pub category_id: Option<i64>, // 仅门店分配导入
}

// ==========================================
// 时间序列 - 年 → 月 → 日
// ==========================================

/// 某一天的指标值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayEntry {
    pub date: String, // DD-MM-YYYY
    pub day: u32,
    pub values: BTreeMap<String, f64>, // 指标名 → 数值
}

/// 一个自然年的数据（自然键的周期部分）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearSeries {
    pub months: BTreeMap<u32, Vec<DayEntry>>, // 月份(1..=12) → 按日排序的条目
}

impl YearSeries {
    /// 写入一个指标值（同日同指标后写覆盖）
    pub fn insert(&mut self, date: NaiveDate, metric: &str, value: f64) {
        let entries = self.months.entry(date.month()).or_default();
        match entries.iter_mut().find(|e| e.day == date.day()) {
            Some(entry) => {
                entry.values.insert(metric.to_string(), value);
            }
            None => {
                let mut values = BTreeMap::new();
                values.insert(metric.to_string(), value);
                entries.push(DayEntry {
                    date: date.format("%d-%m-%Y").to_string(),
                    day: date.day(),
                    values,
                });
                entries.sort_by_key(|e| e.day);
            }
        }
    }

    /// 合并新导入的数据：同日条目整体替换，其余保留
    pub fn merge_from(&mut self, incoming: &YearSeries) {
        for (month, new_entries) in &incoming.months {
            let entries = self.months.entry(*month).or_default();
            for new_entry in new_entries {
                match entries.iter_mut().find(|e| e.day == new_entry.day) {
                    Some(existing) => *existing = new_entry.clone(),
                    None => entries.push(new_entry.clone()),
                }
            }
            entries.sort_by_key(|e| e.day);
        }
    }

    pub fn day_count(&self) -> usize {
        self.months.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.day_count() == 0
    }
}

// ==========================================
// ValidatedRecord - 阶段 1 成功输出
// ==========================================
// 外键已解析为 ID，指标按年分组；提交后丢弃
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub kind: JobKind,
    pub row_number: usize,
    pub sequence: usize, // 数据行序号（从 1 开始）
    pub identity: RowIdentity,
    pub key: RecordKey,
    pub series: BTreeMap<i32, YearSeries>, // 年 → 时间序列
}

// ==========================================
// RowFailure - 阶段 1 失败
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row_number: usize,
    pub sequence: usize,
    pub identity: RowIdentity,
    pub reason: String,
}

impl RowFailure {
    /// 汇总中使用的错误描述（带行号与身份字段）
    pub fn message(&self) -> String {
        format!(
            "Row {} ({}): {}",
            self.row_number, self.identity, self.reason
        )
    }
}

/// 单行处理结果：每一行恰好产生一个
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Success(ValidatedRecord),
    Failure(RowFailure),
}

// ==========================================
// ImportSummary - 终态汇总
// ==========================================
// 不变量: total_rows == successful + failed（未提前终止时）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub processing_time: u64, // 毫秒
}

// ==========================================
// ImportBatch - 导入批次审计记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub kind: JobKind,
    pub file_name: Option<String>,
    pub total_rows: i64,
    pub success_rows: i64,
    pub failed_rows: i64,
    pub elapsed_ms: i64,
    pub imported_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

impl ImportBatch {
    pub fn from_summary(job: &ImportJob, summary: &ImportSummary) -> Self {
        Self {
            batch_id: job.job_id.clone(),
            kind: job.kind,
            file_name: job.file_name.clone(),
            total_rows: summary.total_rows as i64,
            success_rows: summary.successful as i64,
            failed_rows: summary.failed as i64,
            elapsed_ms: summary.processing_time as i64,
            imported_at: Utc::now(),
            errors: summary.errors.clone(),
        }
    }
}
