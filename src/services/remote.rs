use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        page::{PageRequest, ResourceKind},
        response::{Ack, ErrorBody},
        trip::{Flag, Trip},
    },
    services::session::Session,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    SetFlag(Flag, bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub id: Option<i64>,
    pub payload: Option<serde_json::Value>,
}

impl Mutation {
    pub fn create(kind: ResourceKind, payload: serde_json::Value) -> Self {
        Self {
            operation: Operation::Create,
            kind,
            id: None,
            payload: Some(payload),
        }
    }

    pub fn update(kind: ResourceKind, id: i64, payload: serde_json::Value) -> Self {
        Self {
            operation: Operation::Update,
            kind,
            id: Some(id),
            payload: Some(payload),
        }
    }

    pub fn delete(kind: ResourceKind, id: i64) -> Self {
        Self {
            operation: Operation::Delete,
            kind,
            id: Some(id),
            payload: None,
        }
    }

    pub fn set_flag(kind: ResourceKind, id: i64, flag: Flag, desired: bool) -> Self {
        Self {
            operation: Operation::SetFlag(flag, desired),
            kind,
            id: Some(id),
            payload: None,
        }
    }

    /// HTTP方法和路径段
    pub fn route(&self) -> Result<(Method, Vec<String>)> {
        let kind = self.kind.path().to_string();
        let id = || {
            self.id
                .map(|id| id.to_string())
                .ok_or_else(|| AppError::validation("Mutation requires a resource id"))
        };

        Ok(match self.operation {
            Operation::Create => (Method::POST, vec![kind]),
            Operation::Update => (Method::PUT, vec![kind, id()?]),
            Operation::Delete => (Method::DELETE, vec![kind, id()?]),
            Operation::SetFlag(flag, true) => (Method::POST, vec![kind, id()?, flag.segment().to_string()]),
            Operation::SetFlag(flag, false) => (Method::DELETE, vec![kind, id()?, flag.segment().to_string()]),
        })
    }
}

/// 远程资源客户端：无状态、不重试
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteResource: Send + Sync {
    async fn fetch_page(&self, kind: ResourceKind, request: &PageRequest) -> Result<Vec<Trip>>;

    async fn fetch_detail(&self, kind: ResourceKind, id: i64) -> Result<Trip>;

    async fn mutate(&self, mutation: &Mutation) -> Result<Ack>;
}

#[derive(Clone)]
pub struct HttpClient {
    base_url: Url,
    http_client: Client,
    session: Arc<Session>,
}

impl HttpClient {
    pub fn new(config: &Config, session: Arc<Session>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.api_base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::internal("API base URL cannot carry path segments"));
        }

        Ok(Self {
            base_url,
            http_client,
            session,
        })
    }

    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::internal("API base URL cannot carry path segments"))?
            .pop_if_empty()
            .extend(segments.iter().map(|s| s.as_ref()));
        Ok(url)
    }

    fn page_url(&self, kind: ResourceKind, request: &PageRequest) -> Result<Url> {
        let mut url = self.endpoint(&[kind.path()])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &request.cursor.to_string())
                .append_pair("size", &request.page_size.to_string())
                .append_pair("sortBy", &request.filter.sort.sort_by)
                .append_pair("isAsc", if request.filter.sort.is_asc { "true" } else { "false" });
            if let Some(area) = request.filter.area.and_then(|a| a.as_filter()) {
                query.append_pair("area", area);
            }
            if let Some(keyword) = &request.filter.keyword {
                query.append_pair("keyword", keyword);
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, method: Method, url: Url, payload: Option<&serde_json::Value>) -> Result<Response> {
        debug!("{} {}", method, url);
        let mut builder = self.authorized(self.http_client.request(method.clone(), url.clone()));
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Request {} {} failed: {}", method, url, e);
            AppError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = ErrorBody::message_from(&body);
        warn!("{} {} returned {}: {}", method, url, status, message);
        Err(AppError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl RemoteResource for HttpClient {
    async fn fetch_page(&self, kind: ResourceKind, request: &PageRequest) -> Result<Vec<Trip>> {
        let url = self.page_url(kind, request)?;
        let trips: Vec<Trip> = self.send(Method::GET, url, None).await?.json().await?;

        for trip in &trips {
            if let Err(e) = trip.validate() {
                warn!("Trip {} violates record invariants: {}", trip.trip_id, e);
            }
        }
        debug!("Fetched {} {} on page {}", trips.len(), kind, request.cursor);
        Ok(trips)
    }

    async fn fetch_detail(&self, kind: ResourceKind, id: i64) -> Result<Trip> {
        let url = self.endpoint(&[kind.path().to_string(), id.to_string()])?;
        let trip: Trip = self.send(Method::GET, url, None).await?.json().await?;
        if let Err(e) = trip.validate() {
            warn!("Trip {} violates record invariants: {}", trip.trip_id, e);
        }
        Ok(trip)
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<Ack> {
        let (method, segments) = mutation.route()?;
        let url = self.endpoint(segments.as_slice())?;
        let response = self.send(method, url, mutation.payload.as_ref()).await?;
        let body = response.text().await.unwrap_or_default();
        Ok(Ack::from_body(&body))
    }
}
