use crate::{
    config::Config,
    error::Result,
    models::{
        page::{FeedFilter, FeedKey, ResourceKind},
        plan::{PlanDraft, PlanId},
    },
    services::{
        binding::{DetailView, FeedView},
        draft::{DraftStore, FileDraftStore, PlanEditor},
        mutation::MutationCoordinator,
        query::QueryCache,
        remote::{HttpClient, RemoteResource},
        session::Session,
    },
};
use std::sync::Arc;
use tracing::info;

/// 应用程序的共享状态
/// 进程内唯一的缓存、会话和变更协调器
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 当前用户会话
    pub session: Arc<Session>,

    /// 远程资源客户端
    pub remote: Arc<dyn RemoteResource>,

    /// 查询缓存
    pub cache: Arc<QueryCache>,

    /// 乐观变更协调器
    pub coordinator: MutationCoordinator,

    /// 草稿暂存区
    pub drafts: Arc<dyn DraftStore>,
}

impl AppState {
    /// 缓存为空，会话从持久化令牌恢复
    pub fn init(config: Config) -> Result<Self> {
        let session = Arc::new(Session::hydrate(&config.session_token_path)?);
        let remote: Arc<dyn RemoteResource> = Arc::new(HttpClient::new(&config, session.clone())?);
        let drafts: Arc<dyn DraftStore> = Arc::new(FileDraftStore::new(&config.draft_dir));
        Ok(Self::with_parts(config, session, remote, drafts))
    }

    pub fn with_parts(
        config: Config,
        session: Arc<Session>,
        remote: Arc<dyn RemoteResource>,
        drafts: Arc<dyn DraftStore>,
    ) -> Self {
        let cache = Arc::new(QueryCache::new(remote.clone(), config.feed_page_size));
        let coordinator = MutationCoordinator::new(cache.clone(), remote.clone(), session.clone())
            .with_debounce(config.mutation_debounce());

        info!(
            "Sync state ready (api={}, page_size={}, logged_in={})",
            config.api_base_url,
            config.feed_page_size,
            session.is_logged_in()
        );

        Self {
            config,
            session,
            remote,
            cache,
            coordinator,
            drafts,
        }
    }

    /// 使用配置中的默认排序
    pub fn feed_key(&self, filter: FeedFilter) -> FeedKey {
        FeedKey::trips(filter.with_sort(self.config.feed_sort()))
    }

    pub fn feed_view(&self, filter: FeedFilter) -> FeedView {
        FeedView::mount(self.coordinator.clone(), self.feed_key(filter))
    }

    pub fn detail_view(&self, id: i64) -> DetailView {
        DetailView::mount(self.coordinator.clone(), ResourceKind::Trips, id)
    }

    pub fn plan_editor(&self, plan_id: PlanId, server_copy: Option<PlanDraft>) -> PlanEditor {
        PlanEditor::open(self.drafts.clone(), plan_id, server_copy)
    }

    /// 标记状态依赖当前用户，切换账号时需清空缓存
    pub fn login(&self, token: &str) -> Result<()> {
        self.session.login(token)?;
        self.coordinator.reset();
        self.cache.clear();
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        self.session.logout()?;
        self.coordinator.reset();
        self.cache.clear();
        Ok(())
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    /// 检查是否为开发环境
    pub fn is_development(&self) -> bool {
        self.config.is_development()
    }
}
