#![allow(dead_code)]

use async_trait::async_trait;
use fake::{faker::lorem::en::Sentence, Fake};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use travel_sync::{
    error::{AppError, Result},
    models::{Ack, FeedFilter, FeedKey, PageRequest, ResourceKind, Trip},
    services::{MutationCoordinator, QueryCache, RemoteResource, Session},
};

pub fn fake_trip(id: i64) -> Trip {
    let title: String = Sentence(2..5).fake();
    Trip::new(id, title)
}

pub fn fake_page(ids: std::ops::RangeInclusive<i64>) -> Vec<Trip> {
    ids.map(fake_trip).collect()
}

pub fn default_key() -> FeedKey {
    FeedKey::trips(FeedFilter::default())
}

/// 内存中的远程实现；变更请求可以被“闸门”挂起，便于观察进行中的状态
pub struct FakeRemote {
    pages: Mutex<HashMap<u32, Vec<Trip>>>,
    details: Mutex<HashMap<i64, Trip>>,
    outcomes: Mutex<VecDeque<Result<Ack>>>,
    calls: Mutex<Vec<travel_sync::services::Mutation>>,
    gate: Option<Semaphore>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            details: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// 每个变更请求都要等待 `release` 才返回
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_page(self, cursor: u32, trips: Vec<Trip>) -> Self {
        self.pages.lock().insert(cursor, trips);
        self
    }

    pub fn with_detail(self, trip: Trip) -> Self {
        self.details.lock().insert(trip.trip_id, trip);
        self
    }

    /// 依次排队的变更结果；队列为空时返回成功
    pub fn push_outcome(&self, outcome: Result<Ack>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn release(&self, requests: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(requests);
        }
    }

    pub fn calls(&self) -> Vec<travel_sync::services::Mutation> {
        self.calls.lock().clone()
    }

    pub async fn wait_for_calls(&self, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.calls.lock().len() < expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("remote was not called in time");
    }
}

#[async_trait]
impl RemoteResource for FakeRemote {
    async fn fetch_page(&self, _kind: ResourceKind, request: &PageRequest) -> Result<Vec<Trip>> {
        Ok(self.pages.lock().get(&request.cursor).cloned().unwrap_or_default())
    }

    async fn fetch_detail(&self, _kind: ResourceKind, id: i64) -> Result<Trip> {
        self.details
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found(&format!("Trip {}", id)))
    }

    async fn mutate(&self, mutation: &travel_sync::services::Mutation) -> Result<Ack> {
        self.calls.lock().push(mutation.clone());
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| AppError::internal("gate closed"))?
                .forget();
        }
        let outcome = self.outcomes.lock().pop_front();
        outcome.unwrap_or_else(|| Ok(Ack::default()))
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub cache: Arc<QueryCache>,
    pub coordinator: MutationCoordinator,
}

impl Harness {
    pub fn new(remote: FakeRemote, logged_in: bool) -> Self {
        let remote = Arc::new(remote);
        let cache = Arc::new(QueryCache::new(remote.clone(), 8));
        let session = if logged_in {
            Session::with_token("test-token")
        } else {
            Session::anonymous()
        };
        let coordinator = MutationCoordinator::new(cache.clone(), remote.clone(), Arc::new(session));
        Self {
            remote,
            cache,
            coordinator,
        }
    }

    /// 预先加载第1页
    pub async fn with_first_page(self) -> Self {
        self.cache
            .get_or_fetch(&default_key(), 1)
            .await
            .expect("first page");
        self
    }
}
