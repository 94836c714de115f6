use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// 错误在缓存状态和视图通知之间传递，因此必须可克隆
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Draft is not submittable: {0}")]
    InvalidDraft(#[from] validator::ValidationErrors),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Forbidden(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    /// 按HTTP状态码归类服务端响应
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            400..=499 => Self::Validation(message),
            _ => Self::Server { status, message },
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// 面向用户的提示文本（阻塞式弹窗）
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated => "로그인이 필요합니다.".to_string(),
            Self::InvalidDraft(_) => "모든 입력을 완료해야 다음으로 진행할 수 있습니다.".to_string(),
            Self::Network(_) => "네트워크 연결을 확인해주세요.".to_string(),
            Self::NotFound(_) => "요청한 여행 정보를 찾을 수 없습니다.".to_string(),
            other => format!("요청을 처리하지 못했습니다. 오류: {}", other),
        }
    }
}

// 从其他错误类型转换
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return AppError::Serialization(err.to_string());
        }
        match err.status() {
            Some(status) => AppError::from_status(status.as_u16(), err.to_string()),
            None => AppError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Internal(format!("Invalid endpoint URL: {}", err))
    }
}
