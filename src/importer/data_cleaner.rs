// ==========================================
// 表格批量导入服务 - 数据清洗器
// ==========================================
// 职责: 数值/日期识别与日期归一化
// 日期输出格式统一为 DD-MM-YYYY
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// 大于该值的数字表头视为表格日期序列号
pub const DATE_SERIAL_THRESHOLD: f64 = 40000.0;

/// 规范日期格式
pub const CANONICAL_DATE_FORMAT: &str = "%d-%m-%Y";

// 表格日期序列号上限（9999-12-31）
const MAX_DATE_SERIAL: f64 = 2_958_465.0;

pub struct DataCleaner;

impl DataCleaner {
    /// 数字是否像日期序列号
    pub fn is_date_serial(value: f64) -> bool {
        value.is_finite() && value > DATE_SERIAL_THRESHOLD && value <= MAX_DATE_SERIAL
    }

    /// 表格日期序列号 → 日期（1900 日期系统，基准 1899-12-30，忽略时间部分）
    pub fn date_from_serial(serial: f64) -> Option<NaiveDate> {
        if !serial.is_finite() || serial < 1.0 || serial > MAX_DATE_SERIAL {
            return None;
        }
        let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        base.checked_add_signed(Duration::days(serial.floor() as i64))
    }

    /// 日期 → DD-MM-YYYY
    pub fn format_date(date: NaiveDate) -> String {
        date.format(CANONICAL_DATE_FORMAT).to_string()
    }

    /// 解析文本形式的表头日期（多种常见格式）
    pub fn parse_header_date(value: &str) -> Option<NaiveDate> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        const DATE_FORMATS: [&str; 5] = ["%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y"];
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                return Some(d);
            }
        }
        // ISO 日期时间（如 calamine 的 DateTimeIso）
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
            .map(|dt| dt.date())
            .ok()
    }

    /// 解析规范格式日期（DD-MM-YYYY），派生阶段使用
    pub fn parse_canonical_date(value: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), CANONICAL_DATE_FORMAT).ok()
    }
}
