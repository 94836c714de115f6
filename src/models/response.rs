use serde::{Deserialize, Serialize};

/// 服务端错误响应体；后端可能返回JSON，也可能返回纯文本
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorBody {
    /// 从原始响应文本中提取可读的错误信息
    pub fn message_from(raw: &str) -> String {
        match serde_json::from_str::<ErrorBody>(raw) {
            Ok(ErrorBody { message: Some(message), .. }) => message,
            _ if raw.trim().is_empty() => "empty response body".to_string(),
            _ => raw.trim().to_string(),
        }
    }
}

/// 变更请求的确认结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// 服务端回显的资源ID（`id`、`tripId` 或 `planId`）
    pub resource_id: Option<i64>,
}

impl Ack {
    pub fn from_body(raw: &str) -> Self {
        let resource_id = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|value| {
                ["id", "tripId", "planId"]
                    .iter()
                    .find_map(|field| value.get(*field).and_then(|v| v.as_i64()))
            });
        Self { resource_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_json_and_text() {
        assert_eq!(ErrorBody::message_from(r#"{"message":"제목이 없습니다"}"#), "제목이 없습니다");
        assert_eq!(ErrorBody::message_from("plain failure\n"), "plain failure");
        assert_eq!(ErrorBody::message_from(""), "empty response body");
    }

    #[test]
    fn test_ack_picks_up_echoed_id() {
        assert_eq!(Ack::from_body(r#"{"planId": 31}"#).resource_id, Some(31));
        assert_eq!(Ack::from_body("").resource_id, None);
    }
}
