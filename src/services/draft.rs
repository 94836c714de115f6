use crate::{
    error::{AppError, Result},
    models::{
        page::ResourceKind,
        plan::{PlanDraft, PlanId},
        response::Ack,
        trip::Area,
    },
    services::{
        remote::{Mutation, RemoteResource},
        session::Session,
    },
    utils::validation::parse_budget_input,
};
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

/// 草稿暂存区
pub trait DraftStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<PlanDraft>>;

    fn save(&self, key: &str, draft: &PlanDraft) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// 每个键一个JSON文件
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &str) -> Result<Option<PlanDraft>> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let draft = serde_json::from_str(&raw)?;
        debug!("Loaded draft {} from {}", key, path.display());
        Ok(Some(draft))
    }

    fn save(&self, key: &str, draft: &PlanDraft) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let raw = serde_json::to_string(draft)?;
        // 原子写入
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DraftStore for MemoryDraftStore {
    fn load(&self, key: &str) -> Result<Option<PlanDraft>> {
        match self.entries.lock().get(key) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, draft: &PlanDraft) -> Result<()> {
        let raw = serde_json::to_string(draft)?;
        self.entries.lock().insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// 计划编辑器：每次修改都先写入暂存区
pub struct PlanEditor {
    draft: PlanDraft,
    store: Arc<dyn DraftStore>,
}

impl PlanEditor {
    /// 优先恢复暂存的草稿，其次使用服务端副本，最后新建
    pub fn open(store: Arc<dyn DraftStore>, plan_id: PlanId, server_copy: Option<PlanDraft>) -> Self {
        let key = plan_id.storage_key();
        let staged = match store.load(&key) {
            Ok(staged) => staged,
            Err(e) => {
                warn!("Ignoring unreadable draft {}: {}", key, e);
                None
            }
        };

        let draft = match (staged, server_copy) {
            (Some(staged), _) => {
                debug!("Restored staged draft {}", key);
                staged
            }
            (None, Some(mut server)) => {
                server.plan_id = plan_id;
                server
            }
            (None, None) => PlanDraft::new(plan_id),
        };

        Self { draft, store }
    }

    pub fn draft(&self) -> &PlanDraft {
        &self.draft
    }

    pub fn storage_key(&self) -> String {
        self.draft.plan_id.storage_key()
    }

    fn update(&mut self, apply: impl FnOnce(&mut PlanDraft)) -> Result<()> {
        apply(&mut self.draft);
        self.store.save(&self.storage_key(), &self.draft)
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        self.update(|draft| draft.total_plan_title = title.to_string())
    }

    pub fn set_area(&mut self, area: Area) -> Result<()> {
        self.update(|draft| draft.area = area.label().to_string())
    }

    pub fn set_budget(&mut self, budget: u64) -> Result<()> {
        self.update(|draft| draft.total_budget = budget)
    }

    /// 输入框原始文本；非数字字符被剔除
    pub fn set_budget_input(&mut self, input: &str) -> Result<()> {
        self.set_budget(parse_budget_input(input))
    }

    pub fn set_date_range(&mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
        self.update(|draft| {
            draft.start_date = start;
            draft.end_date = end;
        })
    }

    pub fn toggle_public(&mut self) -> Result<()> {
        self.update(|draft| draft.is_public = !draft.is_public)
    }

    pub fn set_itinerary(&mut self, itinerary: serde_json::Value) -> Result<()> {
        self.update(|draft| draft.itinerary = itinerary)
    }

    pub fn validate(&self) -> Result<()> {
        self.draft.validate()?;
        Ok(())
    }

    pub fn can_submit(&self) -> bool {
        self.draft.is_submittable()
    }

    /// 提交草稿；未通过校验或未登录时不发请求
    pub async fn submit(&mut self, remote: &dyn RemoteResource, session: &Session) -> Result<Ack> {
        self.validate()?;
        if !session.is_logged_in() {
            return Err(AppError::Unauthenticated);
        }

        let payload = serde_json::to_value(&self.draft)?;
        let staged_key = self.storage_key();
        let mutation = match self.draft.plan_id {
            PlanId::Saved(id) => Mutation::update(ResourceKind::Plans, id, payload),
            PlanId::Unsaved => Mutation::create(ResourceKind::Plans, payload),
        };

        let ack = remote.mutate(&mutation).await?;

        if let Some(id) = ack.resource_id {
            self.draft.plan_id = PlanId::Saved(id);
        }
        self.store.remove(&staged_key)?;
        info!("Plan {} submitted", self.draft.plan_id);
        Ok(ack)
    }

    pub fn discard(self) -> Result<()> {
        let key = self.storage_key();
        self.store.remove(&key)?;
        debug!("Discarded draft {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::remote::{MockRemoteResource, Operation};

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 4, day)
    }

    #[test]
    fn test_every_update_is_staged() {
        let store = Arc::new(MemoryDraftStore::new());
        let mut editor = PlanEditor::open(store.clone(), PlanId::Saved(3), None);
        editor.set_title("벚꽃 여행").unwrap();
        editor.set_budget_input("12,000원").unwrap();

        let staged = store.load("updatePlanData:3").unwrap().unwrap();
        assert_eq!(staged.total_plan_title, "벚꽃 여행");
        assert_eq!(staged.total_budget, 12_000);
    }

    #[test]
    fn test_staged_draft_wins_over_server_copy() {
        let store = Arc::new(MemoryDraftStore::new());
        let mut staged = PlanDraft::new(PlanId::Saved(3));
        staged.total_plan_title = "작성 중".into();
        store.save("updatePlanData:3", &staged).unwrap();

        let mut server = PlanDraft::new(PlanId::Saved(3));
        server.total_plan_title = "서버 버전".into();

        let editor = PlanEditor::open(store, PlanId::Saved(3), Some(server));
        assert_eq!(editor.draft().total_plan_title, "작성 중");
    }

    #[tokio::test]
    async fn test_invalid_draft_is_not_sent() {
        let mut remote = MockRemoteResource::new();
        remote.expect_mutate().times(0);

        let store = Arc::new(MemoryDraftStore::new());
        let mut editor = PlanEditor::open(store, PlanId::Unsaved, None);
        editor.set_area(Area::Seoul).unwrap();
        editor.set_date_range(date(1), date(3)).unwrap();

        let err = editor
            .submit(&remote, &Session::with_token("token"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDraft(_)));
        assert!(!editor.can_submit());
    }

    #[tokio::test]
    async fn test_submit_creates_and_clears_staging() {
        let mut remote = MockRemoteResource::new();
        remote
            .expect_mutate()
            .withf(|m| m.operation == Operation::Create && m.kind == ResourceKind::Plans)
            .times(1)
            .returning(|_| Ok(Ack { resource_id: Some(77) }));

        let store = Arc::new(MemoryDraftStore::new());
        let mut editor = PlanEditor::open(store.clone(), PlanId::Unsaved, None);
        editor.set_title("부산 먹방").unwrap();
        editor.set_area(Area::Busan).unwrap();
        editor.set_budget(500_000).unwrap();
        editor.set_date_range(date(5), date(7)).unwrap();
        assert!(editor.can_submit());

        editor
            .submit(&remote, &Session::with_token("token"))
            .await
            .unwrap();
        assert_eq!(editor.draft().plan_id, PlanId::Saved(77));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_submit_requires_login() {
        let mut remote = MockRemoteResource::new();
        remote.expect_mutate().times(0);

        let mut editor = PlanEditor::open(Arc::new(MemoryDraftStore::new()), PlanId::Saved(1), None);
        editor.set_title("강릉").unwrap();
        editor.set_area(Area::Gangwon).unwrap();
        editor.set_budget(1).unwrap();
        editor.set_date_range(date(1), date(1)).unwrap();

        let err = editor.submit(&remote, &Session::anonymous()).await.unwrap_err();
        assert_eq!(err, AppError::Unauthenticated);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path().join("drafts"));

        assert_eq!(store.load("updatePlanData:unsaved").unwrap(), None);

        let mut draft = PlanDraft::default();
        draft.total_plan_title = "제주".into();
        store.save("updatePlanData:unsaved", &draft).unwrap();
        assert_eq!(store.load("updatePlanData:unsaved").unwrap(), Some(draft));

        store.remove("updatePlanData:unsaved").unwrap();
        store.remove("updatePlanData:unsaved").unwrap();
        assert_eq!(store.load("updatePlanData:unsaved").unwrap(), None);
    }

    #[test]
    fn test_corrupt_staging_falls_back_to_fresh_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDraftStore::new(dir.path());
        fs::write(dir.path().join("updatePlanData_9.json"), "{not json").unwrap();

        let editor = PlanEditor::open(Arc::new(store), PlanId::Saved(9), None);
        assert_eq!(editor.draft(), &PlanDraft::new(PlanId::Saved(9)));
    }
}
