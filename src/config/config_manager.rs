// ==========================================
// 表格批量导入服务 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PROGRESS_INTERVAL_ROWS,
    DEFAULT_REFERENCE_CACHE_TTL_SECS,
};
use crate::repository::connection::SharedConnection;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::str::FromStr;

/// 配置键（scope_id = 'global'）
pub mod config_keys {
    pub const CHUNK_SIZE: &str = "import.chunk_size";
    pub const PROGRESS_INTERVAL_ROWS: &str = "import.progress_interval_rows";
    pub const MAX_UPLOAD_BYTES: &str = "import.max_upload_bytes";
    pub const REFERENCE_CACHE_TTL_SECS: &str = "import.reference_cache_ttl_secs";
    pub const STOP_ON_DISCONNECT: &str = "import.stop_on_disconnect";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Clone)]
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub async fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let key = key.to_string();
        self.conn
            .run(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub async fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .run(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO config_kv (scope_id, key, value, updated_at)
                    VALUES ('global', ?1, ?2, datetime('now'))
                    ON CONFLICT(scope_id, key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                    params![key, value],
                )?;
                Ok(())
            })
            .await
    }

    /// 获取所有 global 配置的快照
    pub async fn get_config_snapshot(&self) -> RepositoryResult<HashMap<String, String>> {
        self.conn
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
                )?;
                let map = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<HashMap<String, String>, _>>()?;
                Ok(map)
            })
            .await
    }

    /// 读取并解析配置值；缺失或无法解析时返回默认值
    async fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr + Send,
    {
        let Some(raw) = self.get_global_config_value(key).await? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "配置值无法解析，使用默认值");
                Ok(default)
            }
        }
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_chunk_size(&self) -> RepositoryResult<usize> {
        let size = self
            .get_parsed_or_default(config_keys::CHUNK_SIZE, DEFAULT_CHUNK_SIZE)
            .await?;
        if size == 0 {
            tracing::warn!("import.chunk_size=0，校正为 1");
        }
        Ok(size.max(1))
    }

    async fn get_progress_interval_rows(&self) -> RepositoryResult<usize> {
        self.get_parsed_or_default(
            config_keys::PROGRESS_INTERVAL_ROWS,
            DEFAULT_PROGRESS_INTERVAL_ROWS,
        )
        .await
    }

    async fn get_max_upload_bytes(&self) -> RepositoryResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_UPLOAD_BYTES, DEFAULT_MAX_UPLOAD_BYTES)
            .await
    }

    async fn get_reference_cache_ttl_secs(&self) -> RepositoryResult<u64> {
        self.get_parsed_or_default(
            config_keys::REFERENCE_CACHE_TTL_SECS,
            DEFAULT_REFERENCE_CACHE_TTL_SECS,
        )
        .await
    }

    async fn get_stop_on_disconnect(&self) -> RepositoryResult<bool> {
        let Some(raw) = self
            .get_global_config_value(config_keys::STOP_ON_DISCONNECT)
            .await?
        else {
            return Ok(false);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => {
                tracing::warn!(value = %raw, "import.stop_on_disconnect 无法解析，使用默认值");
                Ok(false)
            }
        }
    }
}
