use crate::{
    error::{AppError, Result},
    models::{
        page::{FeedKey, FeedPage, PageRequest, ResourceKind},
        trip::{Flag, Trip},
    },
    services::remote::RemoteResource,
    utils::validation::validate_cursor,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

type RecordKey = (ResourceKind, i64);

#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error(AppError),
}

impl QueryStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// 缓存状态变化通知
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    FeedChanged(FeedKey),
    FeedInvalidated(FeedKey),
    RecordChanged { kind: ResourceKind, id: i64 },
    RecordRemoved { kind: ResourceKind, id: i64 },
    MutationFailed { kind: ResourceKind, id: i64, error: AppError },
    Cleared,
}

impl CacheEvent {
    pub fn concerns_feed(&self, key: &FeedKey) -> bool {
        match self {
            Self::FeedChanged(k) | Self::FeedInvalidated(k) => k == key,
            Self::RecordChanged { kind, .. }
            | Self::RecordRemoved { kind, .. }
            | Self::MutationFailed { kind, .. } => *kind == key.kind,
            Self::Cleared => true,
        }
    }

    pub fn concerns_record(&self, record_kind: ResourceKind, record_id: i64) -> bool {
        match self {
            Self::RecordChanged { kind, id }
            | Self::RecordRemoved { kind, id }
            | Self::MutationFailed { kind, id, .. } => *kind == record_kind && *id == record_id,
            Self::Cleared => true,
            _ => false,
        }
    }
}

/// 某个列表键当前的可见状态
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub status: QueryStatus,
    pub trips: Vec<Trip>,
    pub has_more: bool,
    pub pages_loaded: u32,
}

#[derive(Debug, Clone)]
struct StoredPage {
    trips: Vec<Trip>,
    /// 服务端原始返回条数（去重前），用于判断是否还有下一页
    returned: usize,
}

#[derive(Debug)]
struct FeedEntry {
    pages: BTreeMap<u32, StoredPage>,
    status: QueryStatus,
    epoch: u64,
}

impl FeedEntry {
    fn new(epoch: u64) -> Self {
        Self {
            pages: BTreeMap::new(),
            status: QueryStatus::Idle,
            epoch,
        }
    }

    fn has_more(&self, page_size: u32) -> bool {
        match self.pages.values().next_back() {
            None => true,
            Some(last) => last.returned as u32 == page_size,
        }
    }

    fn last_cursor(&self) -> u32 {
        self.pages.keys().next_back().copied().unwrap_or(0)
    }

    /// 写入一页：同一游标整体替换；新页中出现的ID从其他页移除；浏览数取较大值
    fn store(&mut self, page: FeedPage) {
        let FeedPage { cursor, mut trips, .. } = page;
        let returned = trips.len();

        let mut seen = HashSet::new();
        trips.retain(|trip| seen.insert(trip.trip_id));

        let mut previous_views: HashMap<i64, u64> = HashMap::new();
        for (page_cursor, page) in self.pages.iter_mut() {
            for trip in &page.trips {
                if seen.contains(&trip.trip_id) {
                    previous_views.insert(trip.trip_id, trip.view_count);
                }
            }
            if *page_cursor != cursor {
                page.trips.retain(|trip| !seen.contains(&trip.trip_id));
            }
        }

        for trip in trips.iter_mut() {
            if let Some(views) = previous_views.get(&trip.trip_id) {
                trip.view_count = trip.view_count.max(*views);
            }
        }

        self.pages.insert(cursor, StoredPage { trips, returned });
    }

    fn records_mut(&mut self) -> impl Iterator<Item = &mut Trip> {
        self.pages.values_mut().flat_map(|page| page.trips.iter_mut())
    }
}

#[derive(Debug)]
struct DetailEntry {
    trip: Option<Trip>,
    status: QueryStatus,
    epoch: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    feeds: HashMap<FeedKey, FeedEntry>,
    details: HashMap<RecordKey, DetailEntry>,
    hidden: HashSet<RecordKey>,
    next_epoch: u64,
}

impl CacheState {
    fn bump(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn feed_mut(&mut self, key: &FeedKey) -> &mut FeedEntry {
        let epoch = self.bump();
        self.feeds
            .entry(key.clone())
            .or_insert_with(|| FeedEntry::new(epoch))
    }

    fn detail_mut(&mut self, record: RecordKey) -> &mut DetailEntry {
        let epoch = self.bump();
        self.details.entry(record).or_insert_with(|| DetailEntry {
            trip: None,
            status: QueryStatus::Idle,
            epoch,
        })
    }

    fn visible(&self, kind: ResourceKind, trips: &[Trip]) -> Vec<Trip> {
        trips
            .iter()
            .filter(|trip| !self.hidden.contains(&(kind, trip.trip_id)))
            .cloned()
            .collect()
    }

    fn feed_records_mut(&mut self, kind: ResourceKind) -> impl Iterator<Item = &mut Trip> {
        self.feeds
            .iter_mut()
            .filter(move |(key, _)| key.kind == kind)
            .flat_map(|(_, entry)| entry.records_mut())
    }
}

/// 按 (资源类型, 过滤条件) 累积分页数据的查询缓存
pub struct QueryCache {
    remote: Arc<dyn RemoteResource>,
    page_size: u32,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new(remote: Arc<dyn RemoteResource>, page_size: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            page_size,
            state: Mutex::new(CacheState::default()),
            events,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: CacheEvent) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(event);
    }

    // ========================
    // 列表
    // ========================

    /// 已缓存的某一页（不发请求）
    pub fn cached_page(&self, key: &FeedKey, cursor: u32) -> Option<Vec<Trip>> {
        let state = self.state.lock();
        let page = state.feeds.get(key)?.pages.get(&cursor)?;
        Some(state.visible(key.kind, &page.trips))
    }

    /// 命中缓存直接返回，否则请求该页并写入缓存
    pub async fn get_or_fetch(&self, key: &FeedKey, cursor: u32) -> Result<Vec<Trip>> {
        validate_cursor(cursor)?;
        if let Some(page) = self.cached_page(key, cursor) {
            debug!("Cache hit for {} page {}", key, cursor);
            return Ok(page);
        }
        self.fetch_page(key, cursor).await
    }

    /// 忽略缓存重新请求某一页
    pub async fn refetch(&self, key: &FeedKey, cursor: u32) -> Result<Vec<Trip>> {
        validate_cursor(cursor)?;
        self.fetch_page(key, cursor).await
    }

    /// 加载下一页；最后一页不满时返回 `None` 且不发请求
    pub async fn fetch_next(&self, key: &FeedKey) -> Result<Option<Vec<Trip>>> {
        let next = {
            let state = self.state.lock();
            match state.feeds.get(key) {
                None => 1,
                Some(entry) if !entry.has_more(self.page_size) => {
                    debug!("{} is exhausted after page {}", key, entry.last_cursor());
                    return Ok(None);
                }
                Some(entry) => entry.last_cursor() + 1,
            }
        };
        self.fetch_page(key, next).await.map(Some)
    }

    async fn fetch_page(&self, key: &FeedKey, cursor: u32) -> Result<Vec<Trip>> {
        let epoch = {
            let mut state = self.state.lock();
            let entry = state.feed_mut(key);
            entry.status = QueryStatus::Loading;
            entry.epoch
        };
        self.publish(CacheEvent::FeedChanged(key.clone()));

        let request = PageRequest::new(cursor, self.page_size, key.filter.clone());
        let result = self.remote.fetch_page(key.kind, &request).await;

        let outcome = {
            let mut state = self.state.lock();
            let current = state.feeds.get(key).map(|entry| entry.epoch);
            if current != Some(epoch) {
                debug!("Discarding stale response for {} page {}", key, cursor);
                return result.map(|trips| state.visible(key.kind, &trips));
            }

            let page_size = self.page_size;
            let entry = state.feed_mut(key);
            match result {
                Ok(trips) => {
                    let page = FeedPage::new(cursor, page_size, trips);
                    debug!(
                        "Stored {} page {} ({} records, has_more={})",
                        key,
                        cursor,
                        page.trips.len(),
                        page.has_more()
                    );
                    entry.store(page);
                    entry.status = QueryStatus::Success;
                    let stored = entry.pages.get(&cursor).map(|p| p.trips.clone()).unwrap_or_default();
                    Ok(state.visible(key.kind, &stored))
                }
                Err(e) => {
                    warn!("Failed to fetch {} page {}: {}", key, cursor, e);
                    entry.status = QueryStatus::Error(e.clone());
                    Err(e)
                }
            }
        };

        self.publish(CacheEvent::FeedChanged(key.clone()));
        outcome
    }

    pub fn has_more(&self, key: &FeedKey) -> bool {
        let state = self.state.lock();
        state
            .feeds
            .get(key)
            .map(|entry| entry.has_more(self.page_size))
            .unwrap_or(true)
    }

    pub fn status(&self, key: &FeedKey) -> QueryStatus {
        let state = self.state.lock();
        state
            .feeds
            .get(key)
            .map(|entry| entry.status.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self, key: &FeedKey) -> FeedSnapshot {
        let state = self.state.lock();
        match state.feeds.get(key) {
            None => FeedSnapshot {
                status: QueryStatus::Idle,
                trips: Vec::new(),
                has_more: true,
                pages_loaded: 0,
            },
            Some(entry) => {
                let trips = entry
                    .pages
                    .values()
                    .flat_map(|page| page.trips.iter())
                    .filter(|trip| !state.hidden.contains(&(key.kind, trip.trip_id)))
                    .cloned()
                    .collect();
                FeedSnapshot {
                    status: entry.status.clone(),
                    trips,
                    has_more: entry.has_more(self.page_size),
                    pages_loaded: entry.pages.len() as u32,
                }
            }
        }
    }

    /// 丢弃该键的全部分页，下一次请求从第1页开始
    pub fn invalidate(&self, key: &FeedKey) {
        let invalidated = {
            let mut state = self.state.lock();
            let epoch = state.bump();
            match state.feeds.get_mut(key) {
                Some(entry) => {
                    *entry = FeedEntry::new(epoch);
                    true
                }
                None => false,
            }
        };
        if invalidated {
            debug!("Invalidated {}", key);
            self.publish(CacheEvent::FeedInvalidated(key.clone()));
        }
    }

    pub fn invalidate_kind(&self, kind: ResourceKind) {
        let keys: Vec<FeedKey> = {
            let state = self.state.lock();
            state.feeds.keys().filter(|key| key.kind == kind).cloned().collect()
        };
        for key in keys {
            self.invalidate(&key);
        }
    }

    // ========================
    // 详情
    // ========================

    pub fn detail(&self, kind: ResourceKind, id: i64) -> Option<Trip> {
        let state = self.state.lock();
        if state.hidden.contains(&(kind, id)) {
            return None;
        }
        state.details.get(&(kind, id)).and_then(|entry| entry.trip.clone())
    }

    pub fn detail_status(&self, kind: ResourceKind, id: i64) -> QueryStatus {
        let state = self.state.lock();
        state
            .details
            .get(&(kind, id))
            .map(|entry| entry.status.clone())
            .unwrap_or_default()
    }

    pub async fn get_or_fetch_detail(&self, kind: ResourceKind, id: i64) -> Result<Trip> {
        if let Some(trip) = self.detail(kind, id) {
            return Ok(trip);
        }
        self.refresh_detail(kind, id).await
    }

    /// 重新请求详情，并合并到所有包含该记录的列表页
    pub async fn refresh_detail(&self, kind: ResourceKind, id: i64) -> Result<Trip> {
        let epoch = {
            let mut state = self.state.lock();
            let entry = state.detail_mut((kind, id));
            entry.status = QueryStatus::Loading;
            entry.epoch
        };
        self.publish(CacheEvent::RecordChanged { kind, id });

        let result = self.remote.fetch_detail(kind, id).await;

        let outcome = {
            let mut state = self.state.lock();
            let current = state.details.get(&(kind, id)).map(|entry| entry.epoch);
            if current != Some(epoch) {
                debug!("Discarding stale detail response for {} {}", kind, id);
                return result;
            }

            match result {
                Ok(fresh) => {
                    let entry = state.detail_mut((kind, id));
                    let merged = match entry.trip.as_mut() {
                        Some(cached) => {
                            cached.merge_from(&fresh);
                            cached.clone()
                        }
                        None => fresh,
                    };
                    entry.trip = Some(merged.clone());
                    entry.status = QueryStatus::Success;

                    for record in state.feed_records_mut(kind) {
                        if record.trip_id == id {
                            record.merge_from(&merged);
                        }
                    }
                    Ok(merged)
                }
                Err(e) => {
                    warn!("Failed to fetch {} {}: {}", kind, id, e);
                    state.detail_mut((kind, id)).status = QueryStatus::Error(e.clone());
                    Err(e)
                }
            }
        };

        self.publish(CacheEvent::RecordChanged { kind, id });
        outcome
    }

    // ========================
    // 记录级写操作（仅供变更协调器使用）
    // ========================

    pub fn contains(&self, kind: ResourceKind, id: i64) -> bool {
        self.flag(kind, id, Flag::Like).is_some()
    }

    /// 当前缓存中的标记值；详情优先，其次是任意列表页中的副本
    pub fn flag(&self, kind: ResourceKind, id: i64, flag: Flag) -> Option<bool> {
        let mut state = self.state.lock();
        if state.hidden.contains(&(kind, id)) {
            return None;
        }
        if let Some(trip) = state.details.get(&(kind, id)).and_then(|entry| entry.trip.as_ref()) {
            return Some(trip.flag(flag));
        }
        let found = state
            .feed_records_mut(kind)
            .find(|trip| trip.trip_id == id)
            .map(|trip| trip.flag(flag));
        found
    }

    /// 修改所有副本中的标记值，返回是否找到记录
    pub fn set_flag(&self, kind: ResourceKind, id: i64, flag: Flag, value: bool) -> bool {
        let found = {
            let mut state = self.state.lock();
            let mut found = false;
            if let Some(trip) = state.details.get_mut(&(kind, id)).and_then(|entry| entry.trip.as_mut()) {
                trip.set_flag(flag, value);
                found = true;
            }
            for trip in state.feed_records_mut(kind) {
                if trip.trip_id == id {
                    trip.set_flag(flag, value);
                    found = true;
                }
            }
            found
        };
        if found {
            self.publish(CacheEvent::RecordChanged { kind, id });
        }
        found
    }

    /// 乐观删除：记录暂时不可见，但仍保留在原位置
    pub fn hide(&self, kind: ResourceKind, id: i64) {
        self.state.lock().hidden.insert((kind, id));
        self.publish(CacheEvent::RecordRemoved { kind, id });
    }

    /// 删除失败时恢复记录
    pub fn unhide(&self, kind: ResourceKind, id: i64) {
        let restored = self.state.lock().hidden.remove(&(kind, id));
        if restored {
            self.publish(CacheEvent::RecordChanged { kind, id });
        }
    }

    /// 删除已确认：从所有列表页和详情缓存中移除
    pub fn purge(&self, kind: ResourceKind, id: i64) {
        {
            let mut state = self.state.lock();
            state.hidden.remove(&(kind, id));
            state.details.remove(&(kind, id));
            for (key, entry) in state.feeds.iter_mut() {
                if key.kind == kind {
                    for page in entry.pages.values_mut() {
                        page.trips.retain(|trip| trip.trip_id != id);
                    }
                }
            }
        }
        info!("Purged {} {} from cache", kind, id);
        self.publish(CacheEvent::RecordRemoved { kind, id });
    }

    pub(crate) fn notify_failure(&self, kind: ResourceKind, id: i64, error: AppError) {
        self.publish(CacheEvent::MutationFailed { kind, id, error });
    }

    /// 退出登录时清空
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.feeds.clear();
            state.details.clear();
            state.hidden.clear();
        }
        info!("Query cache cleared");
        self.publish(CacheEvent::Cleared);
    }
}
