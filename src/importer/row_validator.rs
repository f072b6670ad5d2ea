// ==========================================
// 表格批量导入服务 - 行校验与转换（阶段 1）
// ==========================================
// 步骤（首个失败即短路）:
//   1) 身份字段存在性
//   2) 身份字段解析为实体
//   3) 实体关联校验
//   4) 指标字段派生为时间序列
//   5) 输出待落库记录
// 红线: 不做任何 I/O，只读参考快照
// ==========================================

use crate::domain::import::{RawRow, RecordKey, RowFailure, RowIdentity, RowOutcome, ValidatedRecord};
use crate::domain::reference::{Brand, Category, ReferenceSnapshot, Store};
use crate::domain::types::{JobKind, BRAND_CODE_FIELD, CATEGORY_CODE_FIELD, STORE_CODE_FIELD};
use crate::importer::derivation::derive_time_series;
use crate::importer::import_trait::RowValidator;

/// 已解析的实体
struct Resolved<'a> {
    store: &'a Store,
    brand: &'a Brand,
    category: Option<&'a Category>,
}

fn identity_of(row: &RawRow) -> RowIdentity {
    RowIdentity {
        store_code: row.text(STORE_CODE_FIELD),
        brand_code: row.text(BRAND_CODE_FIELD),
        category_code: row.text(CATEGORY_CODE_FIELD),
    }
}

/// 步骤 1: 身份字段存在性
fn check_required(kind: JobKind, row: &RawRow) -> Result<(), String> {
    let missing: Vec<&str> = kind
        .identity_fields()
        .iter()
        .copied()
        .filter(|f| row.text(f).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required fields: {}", missing.join(", ")))
    }
}

/// 步骤 2: 解析实体
fn resolve<'a>(
    kind: JobKind,
    identity: &RowIdentity,
    snapshot: &'a ReferenceSnapshot,
) -> Result<Resolved<'a>, String> {
    let store_code = identity.store_code.as_deref().unwrap_or_default();
    let store = snapshot
        .store(store_code)
        .ok_or_else(|| format!("Store '{}' not found", store_code))?;

    let brand_code = identity.brand_code.as_deref().unwrap_or_default();
    let brand = snapshot
        .brand(brand_code)
        .ok_or_else(|| format!("Brand '{}' not found", brand_code))?;

    let category = match kind {
        JobKind::Sales => None,
        JobKind::StoreAssignment => {
            let category_code = identity.category_code.as_deref().unwrap_or_default();
            Some(
                snapshot
                    .category(category_code)
                    .ok_or_else(|| format!("Category '{}' not found", category_code))?,
            )
        }
    };

    Ok(Resolved {
        store,
        brand,
        category,
    })
}

/// 步骤 3-5（关联校验由具体校验器提供）
fn validate_row<F>(
    kind: JobKind,
    row: &RawRow,
    snapshot: &ReferenceSnapshot,
    sequence: usize,
    check_association: F,
) -> RowOutcome
where
    F: Fn(&Resolved<'_>, &ReferenceSnapshot) -> Result<(), String>,
{
    let identity = identity_of(row);
    let fail = |identity: RowIdentity, reason: String| {
        RowOutcome::Failure(RowFailure {
            row_number: row.row_number,
            sequence,
            identity,
            reason,
        })
    };

    if let Err(reason) = check_required(kind, row) {
        return fail(identity, reason);
    }

    let resolved = match resolve(kind, &identity, snapshot) {
        Ok(r) => r,
        Err(reason) => return fail(identity, reason),
    };

    if let Err(reason) = check_association(&resolved, snapshot) {
        return fail(identity, reason);
    }

    let series = derive_time_series(row);
    if series.is_empty() {
        return fail(identity, "no dated metric values".to_string());
    }

    RowOutcome::Success(ValidatedRecord {
        kind,
        row_number: row.row_number,
        sequence,
        key: RecordKey {
            store_id: resolved.store.store_id,
            brand_id: resolved.brand.brand_id,
            category_id: resolved.category.map(|c| c.category_id),
        },
        identity,
        series,
    })
}

// ==========================================
// SalesRowValidator - 销售数据
// ==========================================
// 关联: 品牌必须已分配给门店
pub struct SalesRowValidator;

impl RowValidator for SalesRowValidator {
    fn kind(&self) -> JobKind {
        JobKind::Sales
    }

    fn validate(&self, row: &RawRow, snapshot: &ReferenceSnapshot, sequence: usize) -> RowOutcome {
        validate_row(JobKind::Sales, row, snapshot, sequence, |r, snap| {
            if snap.store_sells_brand(r.store.store_id, r.brand.brand_id) {
                Ok(())
            } else {
                Err(format!(
                    "store-brand association not permitted: brand '{}' is not assigned to store '{}'",
                    r.brand.brand_code, r.store.store_code
                ))
            }
        })
    }
}

// ==========================================
// AssignmentRowValidator - 门店分配
// ==========================================
// 关联: 品牌必须属于该品类
pub struct AssignmentRowValidator;

impl RowValidator for AssignmentRowValidator {
    fn kind(&self) -> JobKind {
        JobKind::StoreAssignment
    }

    fn validate(&self, row: &RawRow, snapshot: &ReferenceSnapshot, sequence: usize) -> RowOutcome {
        validate_row(JobKind::StoreAssignment, row, snapshot, sequence, |r, snap| {
            let Some(category) = r.category else {
                return Err("category is required for store assignments".to_string());
            };
            if snap.brand_in_category(r.brand.brand_id, category.category_id) {
                Ok(())
            } else {
                Err(format!(
                    "brand-category association not permitted: brand '{}' is not in category '{}'",
                    r.brand.brand_code, category.category_code
                ))
            }
        })
    }
}

/// 按导入类型选择校验器
pub fn validator_for(kind: JobKind) -> Box<dyn RowValidator> {
    match kind {
        JobKind::Sales => Box::new(SalesRowValidator),
        JobKind::StoreAssignment => Box::new(AssignmentRowValidator),
    }
}
