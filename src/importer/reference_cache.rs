// ==========================================
// 表格批量导入服务 - 参考数据缓存
// ==========================================
// 策略: 构建或复用（build-or-reuse）
// - 首次调用一次性批量读取并建立索引
// - 有效期内的后续调用直接返回同一快照
// - 超过有效期或显式 invalidate() 后下一次调用重建
// - 有效期由调用方逐次传入（随每个请求的导入参数变化）
// 快照本身不可变，以 Arc 共享给各任务
// ==========================================

use crate::domain::reference::ReferenceSnapshot;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::reference_repo::ReferenceRepository;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

struct CachedSnapshot {
    snapshot: Arc<ReferenceSnapshot>,
    built_at: Instant,
}

pub struct ReferenceCache {
    repo: Arc<dyn ReferenceRepository>,
    slot: RwLock<Option<CachedSnapshot>>,
}

impl CachedSnapshot {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.built_at.elapsed() < ttl,
            None => true,
        }
    }
}

impl ReferenceCache {
    pub fn new(repo: Arc<dyn ReferenceRepository>) -> Self {
        Self {
            repo,
            slot: RwLock::new(None),
        }
    }

    /// 返回可用快照，必要时构建
    ///
    /// # 参数
    /// - ttl: 快照有效期（None = 进程内永久有效）
    ///
    /// # 返回
    /// - Ok(Arc<ReferenceSnapshot>): 本次任务使用的快照
    /// - Err(ImportError::ReferenceLoad): 数据源不可用（致命）
    pub async fn get_or_build(&self, ttl: Option<Duration>) -> ImportResult<Arc<ReferenceSnapshot>> {
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh(ttl)) {
                debug!("复用参考数据快照");
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        // 写锁内再检查一次，避免并发任务重复构建
        let mut slot = self.slot.write().await;
        if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh(ttl)) {
            return Ok(Arc::clone(&cached.snapshot));
        }

        let started = Instant::now();
        let snapshot = self
            .repo
            .load_consistent()
            .await
            .map_err(|e| ImportError::ReferenceLoad(e.to_string()))?;
        let (stores, brands, categories, store_brands, brand_categories) = snapshot.counts();
        info!(
            stores,
            brands,
            categories,
            store_brands,
            brand_categories,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "参考数据快照已构建"
        );

        let snapshot = Arc::new(snapshot);
        *slot = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            built_at: Instant::now(),
        });
        Ok(snapshot)
    }

    /// 丢弃当前快照；已取得快照的任务不受影响
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        if slot.take().is_some() {
            info!("参考数据快照已失效");
        }
    }

    pub async fn is_built(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reference::{Brand, Category, Store};
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRepo {
        store_loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ReferenceRepository for CountingRepo {
        async fn load_stores(&self) -> RepositoryResult<Vec<Store>> {
            self.store_loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RepositoryError::DatabaseConnectionError("unreachable".into()));
            }
            Ok(vec![Store {
                store_id: 1,
                store_code: "S1".into(),
                store_name: None,
            }])
        }
        async fn load_brands(&self) -> RepositoryResult<Vec<Brand>> {
            Ok(vec![])
        }
        async fn load_categories(&self) -> RepositoryResult<Vec<Category>> {
            Ok(vec![])
        }
        async fn load_store_brands(&self) -> RepositoryResult<Vec<(i64, i64)>> {
            Ok(vec![])
        }
        async fn load_brand_categories(&self) -> RepositoryResult<Vec<(i64, i64)>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_second_call_reuses_snapshot() {
        let repo = Arc::new(CountingRepo::default());
        let cache = ReferenceCache::new(repo.clone());

        let first = cache.get_or_build(None).await.unwrap();
        let second = cache.get_or_build(None).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.store_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let repo = Arc::new(CountingRepo::default());
        let cache = ReferenceCache::new(repo.clone());

        let first = cache.get_or_build(None).await.unwrap();
        cache.invalidate().await;
        assert!(!cache.is_built().await);
        let second = cache.get_or_build(None).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(repo.store_loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_rebuilt() {
        let repo = Arc::new(CountingRepo::default());
        let cache = ReferenceCache::new(repo.clone());
        let ttl = Some(Duration::from_millis(0));

        cache.get_or_build(ttl).await.unwrap();
        cache.get_or_build(ttl).await.unwrap();
        assert_eq!(repo.store_loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_change_applies_to_existing_snapshot() {
        let repo = Arc::new(CountingRepo::default());
        let cache = ReferenceCache::new(repo.clone());

        cache.get_or_build(None).await.unwrap();
        cache.get_or_build(Some(Duration::from_secs(300))).await.unwrap();
        assert_eq!(repo.store_loads.load(Ordering::SeqCst), 1);

        // 有效期调短后，同一快照立即视为过期
        cache.get_or_build(Some(Duration::ZERO)).await.unwrap();
        assert_eq!(repo.store_loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_reference_load_error() {
        let repo = Arc::new(CountingRepo {
            fail: true,
            ..Default::default()
        });
        let cache = ReferenceCache::new(repo);

        let err = cache.get_or_build(None).await.unwrap_err();
        assert!(matches!(err, ImportError::ReferenceLoad(_)));
        assert!(!cache.is_built().await);
    }
}
