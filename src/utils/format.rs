use chrono::NaiveDate;

/// 千位分隔：1234567 -> "1,234,567"
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// 详情页费用展示，带货币单位
pub fn format_cost(cost: u64) -> String {
    format!("{}원", group_thousands(cost))
}

/// 预算输入框展示
pub fn format_budget(budget: u64) -> String {
    group_thousands(budget)
}

pub fn display_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format!("{} - {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
        _ => "날짜를 선택하세요".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(0), "0원");
        assert_eq!(format_cost(999), "999원");
        assert_eq!(format_cost(1_000), "1,000원");
        assert_eq!(format_cost(1_234_000), "1,234,000원");
    }

    #[test]
    fn test_format_budget() {
        assert_eq!(format_budget(0), "0");
        assert_eq!(format_budget(300_000), "300,000");
    }

    #[test]
    fn test_display_date_range() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 29);
        let end = NaiveDate::from_ymd_opt(2024, 3, 31);
        assert_eq!(display_date_range(start, end), "2024-03-29 - 2024-03-31");
        assert_eq!(display_date_range(start, None), "날짜를 선택하세요");
    }
}
