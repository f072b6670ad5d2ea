// ==========================================
// 表格批量导入服务 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 只有致命错误使用 ImportError 传播；
//       行级校验失败 / 提交失败以值的形式累计到汇总中
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("unsupported file format: {0} (expected .xlsx/.xls/.ods/.csv)")]
    UnsupportedFormat(String),

    #[error("failed to parse spreadsheet: {0}")]
    ParseError(String),

    #[error("file is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    // ===== 参考数据错误 =====
    #[error("failed to load reference data: {0}")]
    ReferenceLoad(String),

    // ===== 配置错误 =====
    #[error("failed to read import settings: {0}")]
    Config(String),

    // ===== 通用错误 =====
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::ParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ParseError(err.to_string())
    }
}

// 实现 From<RepositoryError>：导入流程中的仓储错误只会出现在参考数据加载
impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        ImportError::ReferenceLoad(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
