use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::utils::validation::{not_blank, validate_plan_dates};

/// 暂存键的命名空间
pub const DRAFT_NAMESPACE: &str = "updatePlanData";

/// 计划ID：首次保存前为 `Unsaved`（序列化为 null）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum PlanId {
    Saved(i64),
    #[default]
    Unsaved,
}

impl PlanId {
    pub fn as_saved(&self) -> Option<i64> {
        match self {
            Self::Saved(id) => Some(*id),
            Self::Unsaved => None,
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}:{}", DRAFT_NAMESPACE, self)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(id) => write!(f, "{}", id),
            Self::Unsaved => f.write_str("unsaved"),
        }
    }
}

/// 行程计划草稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_plan_dates"))]
pub struct PlanDraft {
    #[serde(default)]
    pub plan_id: PlanId,
    #[validate(custom = "not_blank")]
    #[serde(default)]
    pub total_plan_title: String,
    #[validate(custom = "not_blank")]
    #[serde(default)]
    pub area: String,
    #[validate(range(min = 1))]
    #[serde(default)]
    pub total_budget: u64,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[validate(required)]
    pub start_date: Option<NaiveDate>,
    #[validate(required)]
    pub end_date: Option<NaiveDate>,
    /// 逐日行程，原样透传
    #[serde(default)]
    pub itinerary: serde_json::Value,
}

fn default_public() -> bool {
    true
}

impl PlanDraft {
    pub fn new(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            total_plan_title: String::new(),
            area: String::new(),
            total_budget: 0,
            is_public: true,
            start_date: None,
            end_date: None,
            itinerary: serde_json::Value::Null,
        }
    }

    pub fn is_submittable(&self) -> bool {
        self.validate().is_ok()
    }
}

impl Default for PlanDraft {
    fn default() -> Self {
        Self::new(PlanId::Unsaved)
    }
}
