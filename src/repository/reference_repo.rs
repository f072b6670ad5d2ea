// ==========================================
// 表格批量导入服务 - 参考数据 Repository
// ==========================================
// 职责: 门店/品牌/品类及其关联的批量读取（每类实体一次查询）
// 红线: Repository 不含业务规则，只做数据读取
// ==========================================

use crate::domain::reference::{Brand, Category, ReferenceSnapshot, Store};
use crate::repository::connection::SharedConnection;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use rusqlite::{Connection, Transaction};

// ==========================================
// ReferenceRepository Trait
// ==========================================
// 用途: 参考缓存的数据来源
// 实现者: SqliteReferenceRepository
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    async fn load_stores(&self) -> RepositoryResult<Vec<Store>>;

    async fn load_brands(&self) -> RepositoryResult<Vec<Brand>>;

    async fn load_categories(&self) -> RepositoryResult<Vec<Category>>;

    /// (store_id, brand_id)
    async fn load_store_brands(&self) -> RepositoryResult<Vec<(i64, i64)>>;

    /// (brand_id, category_id)
    async fn load_brand_categories(&self) -> RepositoryResult<Vec<(i64, i64)>>;

    /// 一次性读取全部参考数据并构建快照
    ///
    /// 默认实现并发发出五次批量读取；实现者可覆盖为单事务读取，
    /// 以保证时间点一致
    async fn load_consistent(&self) -> RepositoryResult<ReferenceSnapshot> {
        let (stores, brands, categories, store_brands, brand_categories) = futures::try_join!(
            self.load_stores(),
            self.load_brands(),
            self.load_categories(),
            self.load_store_brands(),
            self.load_brand_categories(),
        )?;
        Ok(ReferenceSnapshot::from_parts(
            stores,
            brands,
            categories,
            store_brands,
            brand_categories,
        ))
    }
}

// ==========================================
// SqliteReferenceRepository
// ==========================================
pub struct SqliteReferenceRepository {
    conn: SharedConnection,
}

impl SqliteReferenceRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn query_stores(conn: &Connection) -> RepositoryResult<Vec<Store>> {
        let mut stmt = conn.prepare(
            "SELECT store_id, store_code, store_name FROM store ORDER BY store_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Store {
                    store_id: row.get(0)?,
                    store_code: row.get(1)?,
                    store_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_brands(conn: &Connection) -> RepositoryResult<Vec<Brand>> {
        let mut stmt = conn.prepare(
            "SELECT brand_id, brand_code, brand_name FROM brand ORDER BY brand_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Brand {
                    brand_id: row.get(0)?,
                    brand_code: row.get(1)?,
                    brand_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_categories(conn: &Connection) -> RepositoryResult<Vec<Category>> {
        let mut stmt = conn.prepare(
            "SELECT category_id, category_code, category_name FROM category ORDER BY category_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    category_id: row.get(0)?,
                    category_code: row.get(1)?,
                    category_name: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_pairs(conn: &Connection, sql: &str) -> RepositoryResult<Vec<(i64, i64)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_snapshot(tx: &Transaction) -> RepositoryResult<ReferenceSnapshot> {
        Ok(ReferenceSnapshot::from_parts(
            Self::query_stores(tx)?,
            Self::query_brands(tx)?,
            Self::query_categories(tx)?,
            Self::query_pairs(tx, STORE_BRAND_SQL)?,
            Self::query_pairs(tx, BRAND_CATEGORY_SQL)?,
        ))
    }
}

const STORE_BRAND_SQL: &str = "SELECT store_id, brand_id FROM store_brand";
const BRAND_CATEGORY_SQL: &str = "SELECT brand_id, category_id FROM brand_category";

#[async_trait]
impl ReferenceRepository for SqliteReferenceRepository {
    async fn load_stores(&self) -> RepositoryResult<Vec<Store>> {
        self.conn.run(|conn| Self::query_stores(conn)).await
    }

    async fn load_brands(&self) -> RepositoryResult<Vec<Brand>> {
        self.conn.run(|conn| Self::query_brands(conn)).await
    }

    async fn load_categories(&self) -> RepositoryResult<Vec<Category>> {
        self.conn.run(|conn| Self::query_categories(conn)).await
    }

    async fn load_store_brands(&self) -> RepositoryResult<Vec<(i64, i64)>> {
        self.conn
            .run(|conn| Self::query_pairs(conn, STORE_BRAND_SQL))
            .await
    }

    async fn load_brand_categories(&self) -> RepositoryResult<Vec<(i64, i64)>> {
        self.conn
            .run(|conn| Self::query_pairs(conn, BRAND_CATEGORY_SQL))
            .await
    }

    // 单事务读取：五次查询看到同一时间点的数据
    async fn load_consistent(&self) -> RepositoryResult<ReferenceSnapshot> {
        self.conn
            .run(|conn| {
                let tx = conn.transaction()?;
                let snapshot = Self::query_snapshot(&tx)?;
                tx.commit()?;
                Ok(snapshot)
            })
            .await
    }
}
