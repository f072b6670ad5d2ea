// ==========================================
// 表格批量导入服务 - 指标时间序列派生
// ==========================================
// 职责: 将 "{DD-MM-YYYY} {指标}" 形式的扁平字段名还原为按年/月分组的时间序列
// 规则: 无法解析的字段名或非数值单元格直接跳过，不导致整行失败
// ==========================================

use crate::domain::import::{RawRow, YearSeries};
use crate::domain::types::identity_field_name;
use crate::importer::data_cleaner::DataCleaner;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

/// 拆分字段名为 (日期, 指标名)
///
/// 仅当首个空格前是规范日期且指标名非空时返回 Some
pub fn split_metric_field(field: &str) -> Option<(NaiveDate, &str)> {
    let (head, tail) = field.trim().split_once(' ')?;
    let date = DataCleaner::parse_canonical_date(head)?;
    let metric = tail.trim();
    if metric.is_empty() {
        return None;
    }
    Some((date, metric))
}

/// 派生时间序列
///
/// # 返回
/// - 年 → YearSeries；身份字段与无法识别的字段被忽略
pub fn derive_time_series(row: &RawRow) -> BTreeMap<i32, YearSeries> {
    let mut series: BTreeMap<i32, YearSeries> = BTreeMap::new();

    // 按字段名排序，保证同名指标覆盖顺序稳定
    let mut fields: Vec<_> = row.fields.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, value) in fields {
        if identity_field_name(field).is_some() {
            continue;
        }
        let Some((date, metric)) = split_metric_field(field) else {
            continue;
        };
        let Some(number) = value.as_number() else {
            continue;
        };
        series
            .entry(date.year())
            .or_default()
            .insert(date, metric, number);
    }

    series
}
