use serde::{Deserialize, Serialize};
use std::fmt;

use super::trip::{Area, Trip};

/// 后端资源类型，对应REST路径的第一段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Trips,
    Plans,
}

impl ResourceKind {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Trips => "trips",
            Self::Plans => "plans",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub sort_by: String,
    pub is_asc: bool,
}

impl SortKey {
    pub fn new(sort_by: impl Into<String>, is_asc: bool) -> Self {
        Self {
            sort_by: sort_by.into(),
            is_asc,
        }
    }

    /// 最新发布优先
    pub fn newest() -> Self {
        Self::new("createdAt", false)
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::newest()
    }
}

/// 列表过滤条件；每个不同的过滤条件都是独立的缓存分区
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FeedFilter {
    pub area: Option<Area>,
    pub keyword: Option<String>,
    pub sort: SortKey,
}

impl FeedFilter {
    pub fn with_area(mut self, area: Area) -> Self {
        self.area = match area {
            Area::All => None,
            other => Some(other),
        };
        self
    }

    pub fn with_keyword(mut self, keyword: &str) -> Self {
        let keyword = keyword.trim();
        self.keyword = if keyword.is_empty() {
            None
        } else {
            Some(keyword.to_string())
        };
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedKey {
    pub kind: ResourceKind,
    pub filter: FeedFilter,
}

impl FeedKey {
    pub fn new(kind: ResourceKind, filter: FeedFilter) -> Self {
        Self { kind, filter }
    }

    pub fn trips(filter: FeedFilter) -> Self {
        Self::new(ResourceKind::Trips, filter)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[area={},keyword={},sort={}:{}]",
            self.kind,
            self.filter.area.map(|a| a.label()).unwrap_or("전체"),
            self.filter.keyword.as_deref().unwrap_or(""),
            self.filter.sort.sort_by,
            if self.filter.sort.is_asc { "asc" } else { "desc" },
        )
    }
}

/// 单页请求参数
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub cursor: u32,
    pub page_size: u32,
    pub filter: FeedFilter,
}

impl PageRequest {
    pub fn new(cursor: u32, page_size: u32, filter: FeedFilter) -> Self {
        Self {
            cursor,
            page_size,
            filter,
        }
    }
}

/// 已获取的一页数据
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub cursor: u32,
    pub page_size: u32,
    pub trips: Vec<Trip>,
}

impl FeedPage {
    pub fn new(cursor: u32, page_size: u32, trips: Vec<Trip>) -> Self {
        Self {
            cursor,
            page_size,
            trips,
        }
    }

    /// 返回条数等于页大小时认为还有下一页
    pub fn has_more(&self) -> bool {
        self.trips.len() as u32 == self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more_only_for_full_pages() {
        let full = FeedPage::new(1, 2, vec![Trip::new(1, "a"), Trip::new(2, "b")]);
        let short = FeedPage::new(2, 2, vec![Trip::new(3, "c")]);
        let empty = FeedPage::new(3, 2, vec![]);
        assert!(full.has_more());
        assert!(!short.has_more());
        assert!(!empty.has_more());
    }

    #[test]
    fn test_all_area_and_blank_keyword_collapse_to_no_filter() {
        let filter = FeedFilter::default()
            .with_area(Area::All)
            .with_keyword("   ");
        assert_eq!(filter, FeedFilter::default());
    }

    #[test]
    fn test_distinct_filters_are_distinct_keys() {
        let seoul = FeedKey::trips(FeedFilter::default().with_area(Area::Seoul));
        let busan = FeedKey::trips(FeedFilter::default().with_area(Area::Busan));
        assert_ne!(seoul, busan);
        assert_eq!(seoul.to_string(), "trips[area=서울,keyword=,sort=createdAt:desc]");
    }
}
