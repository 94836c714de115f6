use crate::error::Result;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 当前用户会话；只暴露登录状态和访问令牌
#[derive(Debug, Default)]
pub struct Session {
    token: RwLock<Option<String>>,
    token_path: Option<PathBuf>,
}

impl Session {
    /// 未登录、不持久化的会话
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// 已登录、不持久化的会话
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            token_path: None,
        }
    }

    /// 从持久化的令牌文件恢复会话；文件不存在时为未登录状态
    pub fn hydrate(token_path: impl Into<PathBuf>) -> Result<Self> {
        let token_path = token_path.into();
        let token = match fs::read_to_string(&token_path) {
            Ok(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        debug!(
            "Session hydrated from {} (logged_in={})",
            token_path.display(),
            token.is_some()
        );

        Ok(Self {
            token: RwLock::new(token),
            token_path: Some(token_path),
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn login(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if let Some(path) = &self.token_path {
            persist_token(path, &token)?;
        }
        *self.token.write() = Some(token);
        info!("Viewer logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        *self.token.write() = None;
        if let Some(path) = &self.token_path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove session token {}: {}", path.display(), e);
                    return Err(e.into());
                }
            }
        }
        info!("Viewer logged out");
        Ok(())
    }
}

fn persist_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, token)?;
    Ok(())
}
