use crate::error::{AppError, Result};
use crate::models::{plan::PlanDraft, trip::Trip};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use validator::ValidationError;

/// 去除空白后不能为空（用于 `#[validate(custom)]`）
pub fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::from("값을 입력해주세요."));
        return Err(error);
    }
    Ok(())
}

/// 开始日期不得晚于结束日期；任一缺失时不做比较
pub fn check_date_order(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> std::result::Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            let mut error = ValidationError::new("date_order");
            error.message = Some(Cow::from("시작일은 종료일보다 늦을 수 없습니다."));
            error.add_param(Cow::from("start"), &start.to_string());
            error.add_param(Cow::from("end"), &end.to_string());
            Err(error)
        }
        _ => Ok(()),
    }
}

pub fn validate_trip_dates(trip: &Trip) -> std::result::Result<(), ValidationError> {
    check_date_order(trip.trip_start_date, trip.trip_end_date)
}

pub fn validate_plan_dates(draft: &PlanDraft) -> std::result::Result<(), ValidationError> {
    check_date_order(draft.start_date, draft.end_date)
}

/// 分页游标从1开始
pub fn validate_cursor(cursor: u32) -> Result<()> {
    if cursor == 0 {
        return Err(AppError::Validation("페이지 번호는 1부터 시작합니다.".to_string()));
    }
    Ok(())
}

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\D").expect("Invalid regex pattern")
});

/// 将预算输入框内容解析为金额：剔除所有非数字字符，空输入或溢出时为0
pub fn parse_budget_input(input: &str) -> u64 {
    let digits = NON_DIGITS.replace_all(input, "");
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_blank() {
        assert!(not_blank("서울").is_ok());
        assert!(not_blank("").is_err());
        assert!(not_blank(" \t").is_err());
    }

    #[test]
    fn test_check_date_order() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 3, day);
        assert!(check_date_order(d(1), d(3)).is_ok());
        assert!(check_date_order(d(3), d(3)).is_ok());
        assert!(check_date_order(d(4), d(3)).is_err());
        assert!(check_date_order(None, d(3)).is_ok());
    }

    #[test]
    fn test_validate_cursor() {
        assert!(validate_cursor(1).is_ok());
        assert!(validate_cursor(0).is_err());
    }

    #[test]
    fn test_parse_budget_input() {
        // 有效输入
        assert_eq!(parse_budget_input("300,000"), 300_000);
        assert_eq!(parse_budget_input("1 200원"), 1_200);

        // 无效输入
        assert_eq!(parse_budget_input(""), 0);
        assert_eq!(parse_budget_input("abc"), 0);
        assert_eq!(parse_budget_input(&"9".repeat(40)), 0);
    }
}
