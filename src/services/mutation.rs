use crate::{
    error::{AppError, Result},
    models::{page::ResourceKind, trip::Flag},
    services::{
        query::QueryCache,
        remote::{Mutation, RemoteResource},
        session::Session,
    },
};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type SlotKey = (ResourceKind, i64, Flag);

/// 乐观更新的回执：`optimistic()` 立即可读，`settled()` 等待服务端确认
#[derive(Debug)]
pub struct MutationTicket<T> {
    optimistic: T,
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> MutationTicket<T> {
    pub fn optimistic(&self) -> &T {
        &self.optimistic
    }

    pub async fn settled(self) -> Result<T> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(AppError::internal("Mutation was abandoned before it settled")),
        }
    }
}

/// 某条记录某个标记的待确认状态。
/// 槽位存在期间，它的确认任务一定还在运行。
#[derive(Debug)]
struct FlagSlot {
    /// 每次会话重置后重新分配
    token: u64,
    /// 服务端最后确认的值
    server_value: bool,
    desired: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<Result<bool>>>,
    /// `reset()` 之后等待确认任务收尾
    retired: bool,
}

/// 乐观变更协调器
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: Arc<QueryCache>,
    remote: Arc<dyn RemoteResource>,
    session: Arc<Session>,
    slots: Arc<DashMap<SlotKey, FlagSlot>>,
    next_token: Arc<AtomicU64>,
    debounce: Duration,
}

impl MutationCoordinator {
    pub fn new(cache: Arc<QueryCache>, remote: Arc<dyn RemoteResource>, session: Arc<Session>) -> Self {
        Self {
            cache,
            remote,
            session,
            slots: Arc::new(DashMap::new()),
            next_token: Arc::new(AtomicU64::new(1)),
            debounce: Duration::ZERO,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    fn ensure_logged_in(&self) -> Result<()> {
        if self.session.is_logged_in() {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }

    fn issue_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub fn toggle_like(&self, kind: ResourceKind, id: i64) -> Result<MutationTicket<bool>> {
        self.toggle(kind, id, Flag::Like)
    }

    pub fn toggle_scrap(&self, kind: ResourceKind, id: i64) -> Result<MutationTicket<bool>> {
        self.toggle(kind, id, Flag::Scrap)
    }

    /// 翻转标记：缓存立即更新，确认请求在后台任务中发送。
    /// 必须在 tokio 运行时内调用。
    pub fn toggle(&self, kind: ResourceKind, id: i64, flag: Flag) -> Result<MutationTicket<bool>> {
        if let Err(e) = self.ensure_logged_in() {
            info!("Rejected {} toggle on {} {}: not logged in", flag, kind, id);
            return Err(e);
        }

        let slot_key = (kind, id, flag);
        let (sender, receiver) = oneshot::channel();
        let missing = || AppError::not_found(&format!("{} {}", kind, id));

        // 持有分片锁期间写缓存，保证与确认任务的回滚互斥
        let (desired, spawn_worker) = match self.slots.entry(slot_key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.retired {
                    // 旧会话的请求仍在进行，新意图排在它后面由同一个任务发送
                    let current = self.cache.flag(kind, id, flag).ok_or_else(missing)?;
                    slot.token = self.issue_token();
                    slot.server_value = current;
                    slot.desired = !current;
                    slot.retired = false;
                } else {
                    slot.desired = !slot.desired;
                }
                slot.generation += 1;
                slot.waiters.push(sender);
                self.cache.set_flag(kind, id, flag, slot.desired);
                (slot.desired, false)
            }
            Entry::Vacant(vacant) => {
                let current = self.cache.flag(kind, id, flag).ok_or_else(missing)?;
                let desired = !current;
                vacant.insert(FlagSlot {
                    token: self.issue_token(),
                    server_value: current,
                    desired,
                    generation: 1,
                    waiters: vec![sender],
                    retired: false,
                });
                self.cache.set_flag(kind, id, flag, desired);
                (desired, true)
            }
        };

        debug!("{} {} {} -> {} (optimistic)", kind, id, flag, desired);

        if spawn_worker {
            tokio::spawn(self.clone().confirm_flag(slot_key));
        }

        Ok(MutationTicket {
            optimistic: desired,
            receiver,
        })
    }

    /// 确认阶段：同一 (记录, 标记) 同时最多一个请求，以最后一次意图为准
    async fn confirm_flag(self, slot_key: SlotKey) {
        let (kind, id, flag) = slot_key;

        if self.debounce.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.debounce).await;
        }

        loop {
            let (target, generation, server_value, token) = match self.slots.entry(slot_key) {
                Entry::Occupied(occupied) if occupied.get().retired => {
                    occupied.remove();
                    return;
                }
                Entry::Occupied(occupied) => {
                    let slot = occupied.get();
                    (slot.desired, slot.generation, slot.server_value, slot.token)
                }
                Entry::Vacant(_) => return,
            };

            if target != server_value {
                let outcome = self.remote.mutate(&Mutation::set_flag(kind, id, flag, target)).await;
                match self.slots.entry(slot_key) {
                    Entry::Occupied(occupied) if occupied.get().retired => {
                        debug!("{} {} {} finished after reset: {:?}", kind, id, flag, outcome.map(|_| target));
                        occupied.remove();
                        return;
                    }
                    Entry::Occupied(mut occupied) if occupied.get().token == token => match outcome {
                        Ok(_) => occupied.get_mut().server_value = target,
                        Err(error) if occupied.get().generation == generation => {
                            let previous = occupied.get().server_value;
                            self.cache.set_flag(kind, id, flag, previous);
                            let slot = occupied.remove();
                            warn!("{} {} {} failed, reverted to {}: {}", kind, id, flag, previous, error);
                            self.cache.notify_failure(kind, id, error.clone());
                            for waiter in slot.waiters {
                                let _ = waiter.send(Err(error.clone()));
                            }
                            return;
                        }
                        Err(error) => {
                            debug!("{} {} {} failed but a newer intent exists: {}", kind, id, flag, error);
                            continue;
                        }
                    },
                    Entry::Occupied(_) => {
                        // 旧会话的结果不再适用
                        debug!("{} {} {} re-armed after reset, sending the new intent", kind, id, flag);
                        continue;
                    }
                    Entry::Vacant(_) => return,
                }
            }

            match self.slots.entry(slot_key) {
                Entry::Occupied(occupied)
                    if occupied.get().token == token && occupied.get().generation == generation =>
                {
                    // 等待期间的刷新可能带回旧副本
                    self.cache.set_flag(kind, id, flag, target);
                    let slot = occupied.remove();
                    debug!("{} {} {} settled at {}", kind, id, flag, target);
                    for waiter in slot.waiters {
                        let _ = waiter.send(Ok(target));
                    }
                    return;
                }
                Entry::Occupied(_) => continue,
                Entry::Vacant(_) => return,
            }
        }
    }

    /// 删除需要二次确认
    pub fn request_delete(&self, kind: ResourceKind, id: i64) -> Result<PendingDelete> {
        self.ensure_logged_in()?;
        if !self.cache.contains(kind, id) {
            return Err(AppError::not_found(&format!("{} {}", kind, id)));
        }
        Ok(PendingDelete {
            coordinator: self.clone(),
            kind,
            id,
        })
    }

    /// 退出登录时丢弃所有待确认的标记。
    /// 进行中的请求由各自的确认任务收尾，不再写缓存。
    pub fn reset(&self) {
        for mut entry in self.slots.iter_mut() {
            let slot = entry.value_mut();
            slot.retired = true;
            for waiter in slot.waiters.drain(..) {
                let _ = waiter.send(Err(AppError::Unauthenticated));
            }
        }
        info!("Pending mutations forgotten");
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|entry| !entry.retired).count()
    }
}

/// 等待用户确认的删除
pub struct PendingDelete {
    coordinator: MutationCoordinator,
    kind: ResourceKind,
    id: i64,
}

impl PendingDelete {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// 立即隐藏记录，后台发送删除请求
    pub fn confirm(self) -> Result<MutationTicket<()>> {
        let Self { coordinator, kind, id } = self;
        coordinator.ensure_logged_in()?;
        // 另一个确认已经把它隐藏或删除
        if !coordinator.cache.contains(kind, id) {
            return Err(AppError::not_found(&format!("{} {}", kind, id)));
        }

        coordinator.cache.hide(kind, id);
        info!("Deleting {} {}", kind, id);

        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let result = coordinator
                .remote
                .mutate(&Mutation::delete(kind, id))
                .await
                .map(|_| ());
            match &result {
                Ok(()) => coordinator.cache.purge(kind, id),
                Err(error) => {
                    warn!("Delete of {} {} failed, restoring: {}", kind, id, error);
                    coordinator.cache.unhide(kind, id);
                    coordinator.cache.notify_failure(kind, id, error.clone());
                }
            }
            let _ = sender.send(result);
        });

        Ok(MutationTicket {
            optimistic: (),
            receiver,
        })
    }

    pub fn cancel(self) {
        debug!("Delete of {} {} cancelled", self.kind, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::page::{FeedFilter, FeedKey};
    use crate::models::trip::Trip;
    use crate::models::Ack;
    use crate::services::query::CacheEvent;
    use crate::services::remote::{MockRemoteResource, Operation};

    async fn setup(remote: MockRemoteResource, logged_in: bool) -> MutationCoordinator {
        let remote: Arc<dyn RemoteResource> = Arc::new(remote);
        let cache = Arc::new(QueryCache::new(remote.clone(), 8));
        cache
            .get_or_fetch(&FeedKey::trips(FeedFilter::default()), 1)
            .await
            .unwrap();
        let session = if logged_in {
            Session::with_token("token")
        } else {
            Session::anonymous()
        };
        MutationCoordinator::new(cache, remote, Arc::new(session))
    }

    fn with_feed(mut remote: MockRemoteResource) -> MockRemoteResource {
        remote
            .expect_fetch_page()
            .returning(|_, _| Ok(vec![Trip::new(42, "남해 여행"), Trip::new(43, "속초")]));
        remote
    }

    #[tokio::test]
    async fn test_toggle_success_keeps_optimistic_value() {
        let mut remote = MockRemoteResource::new();
        remote
            .expect_mutate()
            .withf(|m| m.id == Some(42) && m.operation == Operation::SetFlag(Flag::Like, true))
            .times(1)
            .returning(|_| Ok(Ack::default()));
        let coordinator = setup(with_feed(remote), true).await;

        let ticket = coordinator.toggle_like(ResourceKind::Trips, 42).unwrap();
        assert!(*ticket.optimistic());
        assert_eq!(coordinator.cache().flag(ResourceKind::Trips, 42, Flag::Like), Some(true));

        assert_eq!(ticket.settled().await, Ok(true));
        assert_eq!(coordinator.cache().flag(ResourceKind::Trips, 42, Flag::Like), Some(true));
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_toggle_failure_reverts() {
        let mut remote = MockRemoteResource::new();
        remote
            .expect_mutate()
            .times(1)
            .returning(|_| Err(AppError::Server { status: 500, message: "boom".into() }));
        let coordinator = setup(with_feed(remote), true).await;
        let mut events = coordinator.cache().subscribe();

        let ticket = coordinator.toggle_scrap(ResourceKind::Trips, 42).unwrap();
        assert!(ticket.settled().await.is_err());
        assert_eq!(coordinator.cache().flag(ResourceKind::Trips, 42, Flag::Scrap), Some(false));

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            failed |= matches!(event, CacheEvent::MutationFailed { id: 42, .. });
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_double_toggle_sends_nothing() {
        let mut remote = MockRemoteResource::new();
        remote.expect_mutate().times(0);
        let coordinator = setup(with_feed(remote), true).await;

        let first = coordinator.toggle_like(ResourceKind::Trips, 42).unwrap();
        let second = coordinator.toggle_like(ResourceKind::Trips, 42).unwrap();
        assert!(*first.optimistic());
        assert!(!*second.optimistic());

        assert_eq!(first.settled().await, Ok(false));
        assert_eq!(second.settled().await, Ok(false));
        assert_eq!(coordinator.cache().flag(ResourceKind::Trips, 42, Flag::Like), Some(false));
    }

    #[tokio::test]
    async fn test_unauthenticated_toggle_changes_nothing() {
        let mut remote = MockRemoteResource::new();
        remote.expect_mutate().times(0);
        let coordinator = setup(with_feed(remote), false).await;

        let err = coordinator.toggle_like(ResourceKind::Trips, 42).unwrap_err();
        assert_eq!(err, AppError::Unauthenticated);
        assert_eq!(coordinator.cache().flag(ResourceKind::Trips, 42, Flag::Like), Some(false));
        assert!(coordinator.request_delete(ResourceKind::Trips, 42).is_err());
    }

    #[tokio::test]
    async fn test_toggle_unknown_record() {
        let coordinator = setup(with_feed(MockRemoteResource::new()), true).await;
        assert!(matches!(
            coordinator.toggle_like(ResourceKind::Trips, 7),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_confirmed_delete_purges() {
        let mut remote = MockRemoteResource::new();
        remote
            .expect_mutate()
            .withf(|m| m.operation == Operation::Delete && m.id == Some(43))
            .times(1)
            .returning(|_| Ok(Ack::default()));
        let coordinator = setup(with_feed(remote), true).await;

        let pending = coordinator.request_delete(ResourceKind::Trips, 43).unwrap();
        let ticket = pending.confirm().unwrap();
        assert!(!coordinator.cache().contains(ResourceKind::Trips, 43));
        ticket.settled().await.unwrap();

        let snapshot = coordinator.cache().snapshot(&FeedKey::trips(FeedFilter::default()));
        assert_eq!(snapshot.trips.iter().map(|t| t.trip_id).collect::<Vec<_>>(), vec![42]);
    }

    #[tokio::test]
    async fn test_cancelled_delete_is_noop() {
        let mut remote = MockRemoteResource::new();
        remote.expect_mutate().times(0);
        let coordinator = setup(with_feed(remote), true).await;

        coordinator.request_delete(ResourceKind::Trips, 43).unwrap().cancel();
        assert!(coordinator.cache().contains(ResourceKind::Trips, 43));
    }

}
