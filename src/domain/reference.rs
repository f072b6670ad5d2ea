// ==========================================
// 表格批量导入服务 - 参考数据模型
// ==========================================
// 职责: 门店/品牌/品类实体 + 只读参考快照
// 红线: 快照构建后不可变，可跨校验共享
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub store_id: i64,
    pub store_code: String,
    pub store_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub brand_id: i64,
    pub brand_code: String,
    pub brand_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: i64,
    pub category_code: String,
    pub category_name: Option<String>,
}

/// 查找键标准化（TRIM + UPPER），缓存侧与行侧共用
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ==========================================
// ReferenceSnapshot - 参考数据快照
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    stores_by_code: HashMap<String, Store>,
    brands_by_code: HashMap<String, Brand>,
    categories_by_code: HashMap<String, Category>,
    store_brands: HashSet<(i64, i64)>,     // (store_id, brand_id): 门店可经营品牌
    brand_categories: HashSet<(i64, i64)>, // (brand_id, category_id): 品牌所属品类
    loaded_at: Option<DateTime<Utc>>,
}

impl ReferenceSnapshot {
    /// 由批量读取结果构建索引
    pub fn from_parts(
        stores: Vec<Store>,
        brands: Vec<Brand>,
        categories: Vec<Category>,
        store_brands: Vec<(i64, i64)>,
        brand_categories: Vec<(i64, i64)>,
    ) -> Self {
        Self {
            stores_by_code: stores
                .into_iter()
                .map(|s| (normalize_key(&s.store_code), s))
                .collect(),
            brands_by_code: brands
                .into_iter()
                .map(|b| (normalize_key(&b.brand_code), b))
                .collect(),
            categories_by_code: categories
                .into_iter()
                .map(|c| (normalize_key(&c.category_code), c))
                .collect(),
            store_brands: store_brands.into_iter().collect(),
            brand_categories: brand_categories.into_iter().collect(),
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn store(&self, code: &str) -> Option<&Store> {
        self.stores_by_code.get(&normalize_key(code))
    }

    pub fn brand(&self, code: &str) -> Option<&Brand> {
        self.brands_by_code.get(&normalize_key(code))
    }

    pub fn category(&self, code: &str) -> Option<&Category> {
        self.categories_by_code.get(&normalize_key(code))
    }

    pub fn store_sells_brand(&self, store_id: i64, brand_id: i64) -> bool {
        self.store_brands.contains(&(store_id, brand_id))
    }

    pub fn brand_in_category(&self, brand_id: i64, category_id: i64) -> bool {
        self.brand_categories.contains(&(brand_id, category_id))
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// (门店数, 品牌数, 品类数, 门店-品牌关联数, 品牌-品类关联数)
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.stores_by_code.len(),
            self.brands_by_code.len(),
            self.categories_by_code.len(),
            self.store_brands.len(),
            self.brand_categories.len(),
        )
    }
}
