// ==========================================
// 表格批量导入服务 - 导入管道 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// ==========================================

use crate::domain::import::{RawRow, RowOutcome};
use crate::domain::reference::ReferenceSnapshot;
use crate::domain::types::JobKind;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::ParsedSheet;

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 0）
// 实现者: ExcelParser, CsvParser
pub trait FileParser: Send + Sync {
    /// 解析内存中的文件内容
    ///
    /// # 返回
    /// - Ok(ParsedSheet): 占用区域 + 扁平字段名 + 数据行
    /// - Err(ImportError::ParseError): 无法解码或没有表头区域
    fn parse(&self, content: &[u8]) -> ImportResult<ParsedSheet>;
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 行校验与转换（阶段 1）
// 实现者: SalesRowValidator, AssignmentRowValidator
// 红线: 纯计算，不做任何 I/O
pub trait RowValidator: Send + Sync {
    /// 该校验器处理的导入类型
    fn kind(&self) -> JobKind;

    /// 校验一行并转换为待落库记录
    ///
    /// # 参数
    /// - row: 解析后的原始行
    /// - snapshot: 只读参考快照
    /// - sequence: 数据行序号（从 1 开始）
    ///
    /// # 返回
    /// - RowOutcome::Success: 外键已解析、指标已按年分组
    /// - RowOutcome::Failure: 第一个失败原因（短路）
    fn validate(&self, row: &RawRow, snapshot: &ReferenceSnapshot, sequence: usize) -> RowOutcome;
}
