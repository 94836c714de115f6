use crate::{
    error::{AppError, Result},
    models::{
        page::{FeedKey, ResourceKind},
        trip::{Area, Flag, Trip},
    },
    services::{
        mutation::{MutationCoordinator, MutationTicket, PendingDelete},
        query::{CacheEvent, FeedSnapshot, QueryCache, QueryStatus},
    },
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::debug;

/// 阻塞式提示
#[derive(Debug, Clone, PartialEq)]
pub enum ViewNotice {
    LoginRequired,
    Forbidden(String),
    MutationFailed(String),
    Deleted,
    DeleteFailed(String),
}

impl ViewNotice {
    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::Unauthenticated => Self::LoginRequired,
            AppError::Forbidden(message) => Self::Forbidden(message.clone()),
            other => Self::MutationFailed(other.user_message()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::LoginRequired => AppError::Unauthenticated.user_message(),
            Self::Forbidden(message) | Self::MutationFailed(message) => message.clone(),
            Self::Deleted => "삭제되었습니다.".to_string(),
            Self::DeleteFailed(message) => format!("삭제에 실패했습니다. {}", message),
        }
    }
}

impl fmt::Display for ViewNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// 确认结果回到视图时的处理方式
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled<T> {
    Applied(T),
    Failed(ViewNotice),
    /// 视图已卸载，结果只写入了共享缓存
    Detached,
}

/// 卸载句柄；可在其他任务中调用
#[derive(Debug, Clone)]
pub struct MountGuard {
    mounted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl MountGuard {
    fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// 两种视图共用的订阅与回执处理
struct Binding {
    coordinator: MutationCoordinator,
    events: broadcast::Receiver<CacheEvent>,
    guard: MountGuard,
}

impl Binding {
    fn new(coordinator: MutationCoordinator) -> Self {
        let events = coordinator.cache().subscribe();
        Self {
            coordinator,
            events,
            guard: MountGuard::new(),
        }
    }

    fn cache(&self) -> &Arc<QueryCache> {
        self.coordinator.cache()
    }

    /// 等待下一个满足条件的缓存事件；卸载后返回 false
    async fn wait_for(&mut self, relevant: impl Fn(&CacheEvent) -> bool) -> bool {
        loop {
            if !self.guard.is_mounted() {
                return false;
            }
            let notified = self.guard.notify.notified();
            tokio::select! {
                _ = notified => return false,
                received = self.events.recv() => match received {
                    Ok(event) if relevant(&event) => return self.guard.is_mounted(),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("View lagged behind {} cache events", skipped);
                        return self.guard.is_mounted();
                    }
                    Err(broadcast::error::RecvError::Closed) => return false,
                },
            }
        }
    }

    fn toggle(&self, kind: ResourceKind, id: i64, flag: Flag) -> std::result::Result<MutationTicket<bool>, ViewNotice> {
        self.coordinator
            .toggle(kind, id, flag)
            .map_err(|e| ViewNotice::from_error(&e))
    }

    async fn settle<T>(
        &self,
        ticket: MutationTicket<T>,
        on_error: impl FnOnce(&AppError) -> ViewNotice,
    ) -> Reconciled<T> {
        let result = ticket.settled().await;
        if !self.guard.is_mounted() {
            return Reconciled::Detached;
        }
        match result {
            Ok(value) => Reconciled::Applied(value),
            Err(e) => Reconciled::Failed(on_error(&e)),
        }
    }
}

/// 列表视图，绑定到一个列表键
pub struct FeedView {
    binding: Binding,
    key: FeedKey,
}

impl FeedView {
    pub fn mount(coordinator: MutationCoordinator, key: FeedKey) -> Self {
        Self {
            binding: Binding::new(coordinator),
            key,
        }
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    pub fn guard(&self) -> MountGuard {
        self.binding.guard.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.binding.guard.is_mounted()
    }

    pub fn unmount(&self) {
        self.binding.guard.unmount();
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.binding.cache().snapshot(&self.key)
    }

    /// 无限滚动触底；返回是否真的加载了新页
    pub async fn load_more(&self) -> Result<bool> {
        Ok(self.binding.cache().fetch_next(&self.key).await?.is_some())
    }

    /// 下拉刷新：丢弃已加载的页并重新请求第1页
    pub async fn refresh(&self) -> Result<FeedSnapshot> {
        self.binding.cache().invalidate(&self.key);
        self.binding.cache().get_or_fetch(&self.key, 1).await?;
        Ok(self.snapshot())
    }

    pub async fn next_render(&mut self) -> Option<FeedSnapshot> {
        let key = self.key.clone();
        if self.binding.wait_for(|event| event.concerns_feed(&key)).await {
            Some(self.snapshot())
        } else {
            None
        }
    }

    /// 切换地区分类并加载第1页
    pub async fn select_area(&mut self, area: Area) -> Result<FeedSnapshot> {
        let filter = self.key.filter.clone().with_area(area);
        self.rebind(FeedKey::new(self.key.kind, filter)).await
    }

    pub async fn search(&mut self, keyword: &str) -> Result<FeedSnapshot> {
        let filter = self.key.filter.clone().with_keyword(keyword);
        self.rebind(FeedKey::new(self.key.kind, filter)).await
    }

    async fn rebind(&mut self, key: FeedKey) -> Result<FeedSnapshot> {
        debug!("Feed view rebound {} -> {}", self.key, key);
        self.key = key;
        self.binding.cache().get_or_fetch(&self.key, 1).await?;
        Ok(self.snapshot())
    }

    pub fn toggle_like(&self, id: i64) -> std::result::Result<MutationTicket<bool>, ViewNotice> {
        self.binding.toggle(self.key.kind, id, Flag::Like)
    }

    pub fn toggle_scrap(&self, id: i64) -> std::result::Result<MutationTicket<bool>, ViewNotice> {
        self.binding.toggle(self.key.kind, id, Flag::Scrap)
    }

    pub async fn settle(&self, ticket: MutationTicket<bool>) -> Reconciled<bool> {
        self.binding.settle(ticket, ViewNotice::from_error).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailSnapshot {
    pub status: QueryStatus,
    pub trip: Option<Trip>,
    pub delete_dialog_open: bool,
}

/// 详情视图，绑定到一条记录
pub struct DetailView {
    binding: Binding,
    kind: ResourceKind,
    id: i64,
    delete_dialog: Option<PendingDelete>,
}

impl DetailView {
    pub fn mount(coordinator: MutationCoordinator, kind: ResourceKind, id: i64) -> Self {
        Self {
            binding: Binding::new(coordinator),
            kind,
            id,
            delete_dialog: None,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn guard(&self) -> MountGuard {
        self.binding.guard.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.binding.guard.is_mounted()
    }

    pub fn unmount(&self) {
        self.binding.guard.unmount();
    }

    pub async fn load(&self) -> Result<Trip> {
        self.binding.cache().get_or_fetch_detail(self.kind, self.id).await
    }

    pub async fn refresh(&self) -> Result<Trip> {
        self.binding.cache().refresh_detail(self.kind, self.id).await
    }

    pub fn snapshot(&self) -> DetailSnapshot {
        let cache = self.binding.cache();
        DetailSnapshot {
            status: cache.detail_status(self.kind, self.id),
            trip: cache.detail(self.kind, self.id),
            delete_dialog_open: self.delete_dialog.is_some(),
        }
    }

    pub async fn next_render(&mut self) -> Option<DetailSnapshot> {
        let (kind, id) = (self.kind, self.id);
        if self.binding.wait_for(|event| event.concerns_record(kind, id)).await {
            Some(self.snapshot())
        } else {
            None
        }
    }

    pub fn toggle_like(&self) -> std::result::Result<MutationTicket<bool>, ViewNotice> {
        self.binding.toggle(self.kind, self.id, Flag::Like)
    }

    pub fn toggle_scrap(&self) -> std::result::Result<MutationTicket<bool>, ViewNotice> {
        self.binding.toggle(self.kind, self.id, Flag::Scrap)
    }

    pub async fn settle(&self, ticket: MutationTicket<bool>) -> Reconciled<bool> {
        self.binding.settle(ticket, ViewNotice::from_error).await
    }

    /// 只有作者可以打开删除确认框
    pub fn open_delete_dialog(&mut self) -> std::result::Result<(), ViewNotice> {
        let is_writer = self
            .binding
            .cache()
            .detail(self.kind, self.id)
            .map(|trip| trip.is_writer)
            .unwrap_or(false);
        if !is_writer {
            return Err(ViewNotice::Forbidden("작성자만 삭제할 수 있습니다.".to_string()));
        }

        let pending = self
            .binding
            .coordinator
            .request_delete(self.kind, self.id)
            .map_err(|e| ViewNotice::from_error(&e))?;
        self.delete_dialog = Some(pending);
        Ok(())
    }

    pub fn is_delete_dialog_open(&self) -> bool {
        self.delete_dialog.is_some()
    }

    pub fn cancel_delete(&mut self) {
        if let Some(pending) = self.delete_dialog.take() {
            pending.cancel();
        }
    }

    pub fn confirm_delete(&mut self) -> std::result::Result<MutationTicket<()>, ViewNotice> {
        let pending = self
            .delete_dialog
            .take()
            .ok_or_else(|| ViewNotice::MutationFailed("삭제 확인 창이 열려 있지 않습니다.".to_string()))?;
        pending.confirm().map_err(|e| ViewNotice::from_error(&e))
    }

    pub async fn settle_delete(&self, ticket: MutationTicket<()>) -> Reconciled<ViewNotice> {
        match self
            .binding
            .settle(ticket, |e| ViewNotice::DeleteFailed(e.user_message()))
            .await
        {
            Reconciled::Applied(()) => Reconciled::Applied(ViewNotice::Deleted),
            Reconciled::Failed(notice) => Reconciled::Failed(notice),
            Reconciled::Detached => Reconciled::Detached,
        }
    }
}
