// ==========================================
// 表格批量导入服务 - 进度事件
// ==========================================
// 职责: 推送给调用方的结构化进度事件
// 协议: data: <JSON>\n\n，JSON 以 type 区分 progress | complete | error
// ==========================================

use crate::domain::import::{ImportSummary, RowIdentity};
use crate::domain::types::{ImportState, RowStatus};
use serde::{Deserialize, Serialize, Serializer};

/// 单行进度明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    #[serde(flatten)]
    pub identity: RowIdentity,
    pub status: RowStatus,
    pub message: String,
}

/// 进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// 阶段标记（缓存构建、解析、校验、提交）
    PhaseMarker {
        phase: ImportState,
        message: String,
    },
    /// 行级进度；row_data 为空时仅表示推进位置
    RowProgress {
        current_row: usize,
        total_rows: usize,
        row_data: Option<RowData>,
    },
    /// 完成（唯一的终态之一）
    Complete { summary: ImportSummary },
    /// 致命失败（唯一的终态之一）
    Error { message: String },
}

impl ProgressEvent {
    pub fn phase(phase: ImportState, message: impl Into<String>) -> Self {
        ProgressEvent::PhaseMarker {
            phase,
            message: message.into(),
        }
    }

    pub fn row(
        current_row: usize,
        total_rows: usize,
        identity: RowIdentity,
        status: RowStatus,
        message: impl Into<String>,
    ) -> Self {
        ProgressEvent::RowProgress {
            current_row,
            total_rows,
            row_data: Some(RowData {
                identity,
                status,
                message: message.into(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    /// 序列化为 JSON 负载
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"event serialization failed: {}"}}"#,
                e
            )
        })
    }

    /// 完整的 SSE 帧（CLI 输出与测试使用；HTTP 层由 axum 负责分帧）
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

// 线上格式
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEvent<'a> {
    #[serde(rename_all = "camelCase")]
    Progress {
        #[serde(skip_serializing_if = "Option::is_none")]
        current_row: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_rows: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<ImportState>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        row_data: Option<&'a RowData>,
    },
    Complete {
        summary: &'a ImportSummary,
    },
    Error {
        message: &'a str,
    },
}

impl Serialize for ProgressEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            ProgressEvent::PhaseMarker { phase, message } => WireEvent::Progress {
                current_row: None,
                total_rows: None,
                phase: Some(*phase),
                message: Some(message),
                row_data: None,
            },
            ProgressEvent::RowProgress {
                current_row,
                total_rows,
                row_data,
            } => WireEvent::Progress {
                current_row: Some(*current_row),
                total_rows: Some(*total_rows),
                phase: None,
                message: None,
                row_data: row_data.as_ref(),
            },
            ProgressEvent::Complete { summary } => WireEvent::Complete { summary },
            ProgressEvent::Error { message } => WireEvent::Error { message },
        };
        wire.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_row_progress_wire_format() {
        let event = ProgressEvent::row(
            2,
            10,
            RowIdentity {
                store_code: Some("S1".into()),
                brand_code: Some("B1".into()),
                category_code: None,
            },
            RowStatus::Success,
            "saved",
        );
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["currentRow"], 2);
        assert_eq!(json["totalRows"], 10);
        assert_eq!(json["rowData"]["storeCode"], "S1");
        assert_eq!(json["rowData"]["status"], "success");
        assert!(json["rowData"].get("categoryCode").is_none());
    }

    #[test]
    fn test_terminal_events() {
        let complete = ProgressEvent::Complete {
            summary: ImportSummary::default(),
        };
        let json: Value = serde_json::from_str(&complete.to_json()).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["summary"]["failed"], 0);
        assert!(complete.is_terminal());

        let error = ProgressEvent::Error {
            message: "boom".into(),
        };
        assert_eq!(
            error.to_sse_frame(),
            "data: {\"type\":\"error\",\"message\":\"boom\"}\n\n"
        );
    }

    #[test]
    fn test_phase_marker_is_progress_type() {
        let event = ProgressEvent::phase(ImportState::CacheReady, "reference data loaded");
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["phase"], "cache_ready");
        assert!(!event.is_terminal());
    }
}
