use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::utils::validation::validate_trip_dates;

/// 旅行后记记录（列表和详情共用同一结构，详情字段在列表响应中缺省）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_trip_dates"))]
pub struct Trip {
    pub trip_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub area: String,
    pub trip_start_date: Option<NaiveDate>,
    pub trip_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub cost: Option<u64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub image_url_list: Option<Vec<String>>,
    #[serde(default)]
    pub hashtag_list: Vec<String>,
    #[serde(default)]
    pub is_writer: bool,
    #[serde(default)]
    pub is_like: bool,
    #[serde(default)]
    pub is_scrap: bool,
    #[serde(default)]
    pub view_count: u64,

    // 详情字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

impl Trip {
    pub fn new(trip_id: i64, title: impl Into<String>) -> Self {
        Self {
            trip_id,
            title: title.into(),
            area: String::new(),
            trip_start_date: None,
            trip_end_date: None,
            cost: None,
            thumbnail_url: None,
            image_url_list: None,
            hashtag_list: Vec::new(),
            is_writer: false,
            is_like: false,
            is_scrap: false,
            view_count: 0,
            place_name: None,
            content: None,
            nickname: None,
            profile_image: None,
        }
    }

    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Like => self.is_like,
            Flag::Scrap => self.is_scrap,
        }
    }

    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        match flag {
            Flag::Like => self.is_like = value,
            Flag::Scrap => self.is_scrap = value,
        }
    }

    /// 合并较新的服务端副本；浏览数只增不减，详情字段缺省时保留旧值
    pub fn merge_from(&mut self, fresher: &Trip) {
        let view_count = self.view_count.max(fresher.view_count);
        let previous = std::mem::replace(self, fresher.clone());
        self.view_count = view_count;
        if self.image_url_list.is_none() {
            self.image_url_list = previous.image_url_list;
        }
        if self.cost.is_none() {
            self.cost = previous.cost;
        }
        if self.place_name.is_none() {
            self.place_name = previous.place_name;
        }
        if self.content.is_none() {
            self.content = previous.content;
        }
        if self.nickname.is_none() {
            self.nickname = previous.nickname;
        }
        if self.profile_image.is_none() {
            self.profile_image = previous.profile_image;
        }
    }
}

/// 每位用户可切换的布尔标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Like,
    Scrap,
}

impl Flag {
    /// REST子资源路径段
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Scrap => "scrap",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// 地区分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Area {
    #[serde(rename = "전체")]
    All,
    #[serde(rename = "서울")]
    Seoul,
    #[serde(rename = "경기")]
    Gyeonggi,
    #[serde(rename = "강원")]
    Gangwon,
    #[serde(rename = "대전")]
    Daejeon,
    #[serde(rename = "충북충남")]
    Chungcheong,
    #[serde(rename = "경북경남")]
    Gyeongsang,
    #[serde(rename = "부산")]
    Busan,
    #[serde(rename = "울산")]
    Ulsan,
    #[serde(rename = "전북전남")]
    Jeolla,
    #[serde(rename = "제주")]
    Jeju,
}

impl Area {
    pub const ALL: [Area; 11] = [
        Area::All,
        Area::Seoul,
        Area::Gyeonggi,
        Area::Gangwon,
        Area::Daejeon,
        Area::Chungcheong,
        Area::Gyeongsang,
        Area::Busan,
        Area::Ulsan,
        Area::Jeolla,
        Area::Jeju,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Area::All => "전체",
            Area::Seoul => "서울",
            Area::Gyeonggi => "경기",
            Area::Gangwon => "강원",
            Area::Daejeon => "대전",
            Area::Chungcheong => "충북충남",
            Area::Gyeongsang => "경북경남",
            Area::Busan => "부산",
            Area::Ulsan => "울산",
            Area::Jeolla => "전북전남",
            Area::Jeju => "제주",
        }
    }

    /// `전체` 表示不按地区过滤
    pub fn as_filter(&self) -> Option<&'static str> {
        match self {
            Area::All => None,
            other => Some(other.label()),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Area {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Area::ALL
            .iter()
            .copied()
            .find(|area| area.label() == s.trim())
            .ok_or_else(|| crate::error::AppError::validation(&format!("Unknown area: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_record_deserializes_with_defaults() {
        let trip: Trip = serde_json::from_value(json!({
            "tripId": 7,
            "area": "서울",
            "title": "봄날의 고성",
            "tripStartDate": "2024-03-29",
            "tripEndDate": "2024-03-31",
            "thumbnailUrl": "https://cdn.example.com/7.png",
            "hashtagList": ["데이트"],
            "isScrap": true,
            "viewCount": 12
        }))
        .unwrap();

        assert_eq!(trip.trip_id, 7);
        assert!(trip.is_scrap);
        assert!(!trip.is_like);
        assert!(!trip.is_writer);
        assert_eq!(trip.image_url_list, None);
        assert!(trip.validate().is_ok());
    }

    #[test]
    fn test_reversed_dates_fail_validation() {
        let mut trip = Trip::new(1, "거꾸로");
        trip.trip_start_date = NaiveDate::from_ymd_opt(2024, 4, 2);
        trip.trip_end_date = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(trip.validate().is_err());
    }

    #[test]
    fn test_empty_image_list_fails_validation() {
        let mut trip = Trip::new(1, "사진 없음");
        trip.image_url_list = Some(vec![]);
        assert!(trip.validate().is_err());
    }

    #[test]
    fn test_merge_keeps_view_count_monotonic() {
        let mut cached = Trip::new(3, "old");
        cached.view_count = 40;
        cached.content = Some("본문".into());

        let mut fresher = Trip::new(3, "new");
        fresher.view_count = 35;
        fresher.is_like = true;

        cached.merge_from(&fresher);
        assert_eq!(cached.title, "new");
        assert_eq!(cached.view_count, 40);
        assert!(cached.is_like);
        assert_eq!(cached.content.as_deref(), Some("본문"));
    }

    #[test]
    fn test_area_labels_round_trip() {
        for area in Area::ALL {
            assert_eq!(area.label().parse::<Area>().unwrap(), area);
        }
        assert_eq!(Area::All.as_filter(), None);
        assert_eq!(Area::Jeju.as_filter(), Some("제주"));
        assert!("평양".parse::<Area>().is_err());
    }
}
