// ==========================================
// 表格批量导入服务 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流程所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::import_settings::ImportSettings;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入流程所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 阶段 2 分块大小
    ///
    /// # 默认值
    /// - 50（0 校正为 1）
    async fn get_chunk_size(&self) -> RepositoryResult<usize>;

    /// 阶段 1 进度事件节流间隔（行）
    ///
    /// # 默认值
    /// - 25
    async fn get_progress_interval_rows(&self) -> RepositoryResult<usize>;

    /// 上传文件大小上限（字节）
    ///
    /// # 默认值
    /// - 20 MiB
    async fn get_max_upload_bytes(&self) -> RepositoryResult<usize>;

    /// 参考缓存有效期（秒，0 表示不过期）
    ///
    /// # 默认值
    /// - 300
    async fn get_reference_cache_ttl_secs(&self) -> RepositoryResult<u64>;

    /// 调用方断开后是否停止调度新的块
    ///
    /// # 默认值
    /// - false
    async fn get_stop_on_disconnect(&self) -> RepositoryResult<bool>;

    /// 一次性读取全部导入参数
    async fn load_settings(&self) -> RepositoryResult<ImportSettings> {
        Ok(ImportSettings {
            chunk_size: self.get_chunk_size().await?,
            progress_interval_rows: self.get_progress_interval_rows().await?,
            max_upload_bytes: self.get_max_upload_bytes().await?,
            reference_cache_ttl_secs: self.get_reference_cache_ttl_secs().await?,
            stop_on_disconnect: self.get_stop_on_disconnect().await?,
        }
        .normalized())
    }
}
