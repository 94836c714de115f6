//! 旅行点评与行程计划客户端的状态同步层：分页查询缓存、乐观变更和视图绑定。

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
