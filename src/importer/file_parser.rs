// ==========================================
// 表格批量导入服务 - 文件解析器实现
// ==========================================
// 阶段 0: 文件读取与解析（内存缓冲区，不落盘）
// 支持: Excel (.xlsx/.xlsm/.xls/.xlsb/.ods) / CSV (.csv)
// 表头: 两行表头（主表头 + 子表头），主表头缺失时继承左侧最近的非空主表头
// ==========================================

use crate::domain::import::RawRow;
use crate::domain::types::{identity_field_name, CellValue};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::import_trait::FileParser;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::fmt;
use std::io::Cursor;
use tracing::debug;

// ==========================================
// 解析结果
// ==========================================

/// 已占用的单元格区域（0 基绝对坐标，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_letters(self.start_col),
            self.start_row + 1,
            column_letters(self.end_col),
            self.end_row + 1
        )
    }
}

/// 列号 → 列字母（0 → A, 26 → AA）
fn column_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// 解析后的工作表
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub range: CellRange,
    pub field_names: Vec<Option<String>>, // 每列的扁平字段名（无表头的列为 None）
    pub rows: Vec<RawRow>,
}

// ==========================================
// 中间网格（Excel / CSV 共用表头解析逻辑）
// ==========================================

#[derive(Debug, Clone, PartialEq)]
enum GridCell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl GridCell {
    fn from_excel(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => GridCell::Empty,
            Data::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    GridCell::Empty
                } else {
                    GridCell::Text(trimmed.to_string())
                }
            }
            Data::Float(n) => GridCell::Number(*n),
            Data::Int(n) => GridCell::Number(*n as f64),
            Data::Bool(b) => GridCell::Text(b.to_string()),
            Data::DateTime(dt) => match DataCleaner::date_from_serial(dt.as_f64()) {
                Some(d) => GridCell::Date(d),
                None => GridCell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => match DataCleaner::parse_header_date(s) {
                Some(d) => GridCell::Date(d),
                None => GridCell::Text(s.clone()),
            },
            Data::DurationIso(s) => GridCell::Text(s.clone()),
        }
    }

    fn from_csv(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return GridCell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => GridCell::Number(n),
            _ => GridCell::Text(trimmed.to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, GridCell::Empty)
    }

    /// 子表头文本
    fn label(&self) -> Option<String> {
        match self {
            GridCell::Empty => None,
            GridCell::Text(s) => Some(s.clone()),
            GridCell::Number(n) => Some(CellValue::Number(*n).as_text()),
            GridCell::Date(d) => Some(DataCleaner::format_date(*d)),
        }
    }

    /// 主表头文本：日期序列号 / 原生日期 / 文本日期 → DD-MM-YYYY
    fn primary_label(&self) -> Option<String> {
        match self {
            GridCell::Empty => None,
            GridCell::Number(n) if DataCleaner::is_date_serial(*n) => {
                DataCleaner::date_from_serial(*n).map(DataCleaner::format_date)
            }
            GridCell::Text(s) => Some(
                DataCleaner::parse_header_date(s)
                    .map(DataCleaner::format_date)
                    .unwrap_or_else(|| s.clone()),
            ),
            other => other.label(),
        }
    }

    fn into_value(self) -> Option<CellValue> {
        match self {
            GridCell::Empty => None,
            GridCell::Text(s) => Some(CellValue::Text(s)),
            GridCell::Number(n) => Some(CellValue::Number(n)),
            GridCell::Date(d) => Some(CellValue::Date(d)),
        }
    }
}

struct SheetGrid {
    origin_row: u32,
    origin_col: u32,
    rows: Vec<Vec<GridCell>>,
}

impl SheetGrid {
    fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    fn cell(&self, row: usize, col: usize) -> &GridCell {
        const EMPTY: &GridCell = &GridCell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(EMPTY)
    }
}

/// 由两行表头计算每列的扁平字段名
fn resolve_field_names(grid: &SheetGrid) -> Vec<Option<String>> {
    let width = grid.width();
    let mut names = Vec::with_capacity(width);
    let mut last_primary: Option<String> = None;

    for col in 0..width {
        let own_primary = grid.cell(0, col).primary_label();
        let inherited = own_primary.is_none();
        let primary = match own_primary {
            Some(p) => {
                last_primary = Some(p.clone());
                Some(p)
            }
            None => last_primary.clone(),
        };
        let secondary = grid.cell(1, col).label();

        // 身份字段原样保留（仅限自身带主表头的列）
        if !inherited {
            if let Some(identity) = primary.as_deref().and_then(identity_field_name) {
                names.push(Some(identity.to_string()));
                continue;
            }
        }

        let name = match (primary, secondary) {
            (Some(p), Some(s)) => Some(format!("{} {}", p, s)),
            (Some(p), None) => Some(p),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        };
        names.push(name);
    }

    names
}

/// 网格 → 解析结果（数据行从表头起始行下方第二行开始）
fn resolve_sheet(grid: SheetGrid) -> ImportResult<ParsedSheet> {
    let has_header = grid
        .rows
        .first()
        .map(|r| r.iter().any(|c| !c.is_empty()))
        .unwrap_or(false);
    if !has_header {
        return Err(ImportError::ParseError("no header range found".to_string()));
    }

    let field_names = resolve_field_names(&grid);
    let width = field_names.len() as u32;
    let range = CellRange {
        start_row: grid.origin_row,
        start_col: grid.origin_col,
        end_row: grid.origin_row + grid.rows.len() as u32 - 1,
        end_col: grid.origin_col + width.max(1) - 1,
    };

    let origin_row = grid.origin_row as usize;
    let mut rows = Vec::new();
    for (idx, cells) in grid.rows.into_iter().enumerate().skip(2) {
        let mut row = RawRow::new(origin_row + idx + 1);
        for (col, cell) in cells.into_iter().enumerate() {
            let Some(Some(field)) = field_names.get(col) else {
                continue;
            };
            if let Some(value) = cell.into_value() {
                row.fields.insert(field.clone(), value);
            }
        }

        // 跳过完全空白的行
        if row.fields.is_empty() || row.is_empty() {
            continue;
        }
        rows.push(row);
    }

    debug!(range = %range, rows = rows.len(), "表头解析完成");
    Ok(ParsedSheet {
        range,
        field_names,
        rows,
    })
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse(&self, content: &[u8]) -> ImportResult<ParsedSheet> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ParseError("workbook has no worksheets".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;
        let (origin_row, origin_col) = range
            .start()
            .ok_or_else(|| ImportError::ParseError("no header range found".to_string()))?;

        let rows = range
            .rows()
            .map(|r| r.iter().map(GridCell::from_excel).collect())
            .collect();

        resolve_sheet(SheetGrid {
            origin_row,
            origin_col,
            rows,
        })
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, content: &[u8]) -> ImportResult<ParsedSheet> {
        let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(content);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(GridCell::from_csv).collect::<Vec<_>>());
        }

        // 跳过顶部空行，使区域起点与 Excel 一致
        let leading_blank = rows
            .iter()
            .take_while(|r| r.iter().all(GridCell::is_empty))
            .count();
        rows.drain(..leading_blank);

        resolve_sheet(SheetGrid {
            origin_row: leading_blank as u32,
            origin_col: 0,
            rows,
        })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名 / 文件头自动选择）
// ==========================================
pub struct UniversalFileParser;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";

impl UniversalFileParser {
    pub fn parse(&self, file_name: Option<&str>, content: &[u8]) -> ImportResult<ParsedSheet> {
        if content.is_empty() {
            return Err(ImportError::ParseError("file is empty".to_string()));
        }

        let ext = file_name
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase());

        match ext.as_deref() {
            Some("csv") => CsvParser.parse(content),
            Some("xlsx") | Some("xlsm") | Some("xls") | Some("xlsb") | Some("ods") => {
                ExcelParser.parse(content)
            }
            Some(other) => Err(ImportError::UnsupportedFormat(other.to_string())),
            None => {
                if content.starts_with(ZIP_MAGIC) || content.starts_with(OLE_MAGIC) {
                    ExcelParser.parse(content)
                } else if std::str::from_utf8(content).is_ok() {
                    CsvParser.parse(content)
                } else {
                    Err(ImportError::ParseError(
                        "content is neither a workbook nor UTF-8 text".to_string(),
                    ))
                }
            }
        }
    }
}
