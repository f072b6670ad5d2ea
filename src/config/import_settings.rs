// ==========================================
// 表格批量导入服务 - 导入参数
// ==========================================
// 职责: 一次导入任务使用的全部可调参数（默认值 + 校正）
// ==========================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_PROGRESS_INTERVAL_ROWS: usize = 25;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
pub const DEFAULT_REFERENCE_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub chunk_size: usize,             // 阶段 2 每块记录数（同时在途写入上限）
    pub progress_interval_rows: usize, // 阶段 1 进度事件节流间隔
    pub max_upload_bytes: usize,       // 上传文件大小上限
    pub reference_cache_ttl_secs: u64, // 参考缓存有效期（0 = 不过期）
    pub stop_on_disconnect: bool,      // 调用方断开后是否停止调度新的块
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval_rows: DEFAULT_PROGRESS_INTERVAL_ROWS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            reference_cache_ttl_secs: DEFAULT_REFERENCE_CACHE_TTL_SECS,
            stop_on_disconnect: false,
        }
    }
}

impl ImportSettings {
    /// 校正非法取值（块大小与节流间隔至少为 1）
    pub fn normalized(mut self) -> Self {
        self.chunk_size = self.chunk_size.max(1);
        self.progress_interval_rows = self.progress_interval_rows.max(1);
        self
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        if self.reference_cache_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reference_cache_ttl_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let settings = ImportSettings {
            chunk_size: 0,
            progress_interval_rows: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(settings.chunk_size, 1);
        assert_eq!(settings.progress_interval_rows, 1);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let settings = ImportSettings {
            reference_cache_ttl_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.cache_ttl(), None);
        assert_eq!(
            ImportSettings::default().cache_ttl(),
            Some(Duration::from_secs(300))
        );
    }
}
