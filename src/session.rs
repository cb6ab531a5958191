//! Per-user edit session: selection, instruction and the single in-flight slot.

use crate::{
    config::Config,
    error::{EditError, Result},
    gemini::ImageEditor,
    models::{
        EditRequest, ImageResource, OperationState, Outcome, MISSING_INPUT_MESSAGE,
        NOT_AN_IMAGE_MESSAGE,
    },
};
use moka::future::Cache;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct SessionState {
    image: Option<ImageResource>,
    instruction: String,
    state: OperationState,
}

pub struct EditSession {
    id: String,
    editor: Arc<dyn ImageEditor>,
    inner: Mutex<SessionState>,
}

/// Marks the slot failed if the awaiting future is dropped mid-request.
struct InFlightGuard<'a> {
    session: &'a EditSession,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.session.lock();
            if inner.state.is_in_flight() {
                log::warn!("Edit in session {} was cancelled", self.session.id);
                inner.state = OperationState::Failed("request cancelled".into());
            }
        }
    }
}

impl EditSession {
    pub fn new(id: impl Into<String>, editor: Arc<dyn ImageEditor>) -> Self {
        Self {
            id: id.into(),
            editor,
            inner: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the current selection and clears any previous result.
    /// Non-image files are rejected without touching the session.
    pub fn select_image(&self, image: ImageResource) -> Result<()> {
        if !image.is_image() {
            return Err(EditError::Validation(NOT_AN_IMAGE_MESSAGE.into()));
        }
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            return Err(EditError::Busy);
        }
        inner.image = Some(image);
        inner.state = OperationState::Idle;
        Ok(())
    }

    pub fn set_instruction(&self, instruction: impl Into<String>) {
        self.lock().instruction = instruction.into();
    }

    pub fn state(&self) -> OperationState {
        self.lock().state.clone()
    }

    /// Submission is allowed only with an image, an instruction and no call outstanding.
    pub fn can_submit(&self) -> bool {
        let inner = self.lock();
        inner.image.is_some() && !inner.instruction.trim().is_empty() && !inner.state.is_in_flight()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.state() {
            OperationState::Succeeded(result) => Some(Outcome::from_result(result)),
            OperationState::Failed(message) => Some(Outcome::Failed(message)),
            OperationState::Idle | OperationState::InFlight => None,
        }
    }

    /// Runs one edit. `Err` is reserved for validation and the busy slot;
    /// adapter failures come back as `Outcome::Failed`.
    pub async fn submit(&self) -> Result<Outcome> {
        let request = {
            let mut inner = self.lock();
            if inner.state.is_in_flight() {
                return Err(EditError::Busy);
            }
            let image = inner
                .image
                .clone()
                .ok_or_else(|| EditError::Validation(MISSING_INPUT_MESSAGE.into()))?;
            let request = EditRequest::new(image, inner.instruction.clone())?;
            inner.state = OperationState::InFlight;
            request
        };

        let mut guard = InFlightGuard {
            session: self,
            armed: true,
        };

        log::info!("Session {} submitting edit", self.id);
        let result = self
            .editor
            .submit_edit(&request.image, &request.instruction)
            .await;
        guard.armed = false;

        let mut inner = self.lock();
        match result {
            Ok(result) => {
                inner.state = OperationState::Succeeded(result.clone());
                Ok(Outcome::from_result(result))
            }
            Err(e) => {
                let message = e.to_string();
                inner.state = OperationState::Failed(message.clone());
                Ok(Outcome::Failed(message))
            }
        }
    }

    /// Select, describe and submit in one step.
    pub async fn edit(&self, image: ImageResource, instruction: &str) -> Result<Outcome> {
        self.select_image(image)?;
        self.set_instruction(instruction);
        self.submit().await
    }
}

/// Sessions keyed by caller id so each user has their own in-flight slot.
/// Entries unused for the idle window are evicted and the cache is capped.
#[derive(Clone)]
pub struct SessionRegistry {
    editor: Arc<dyn ImageEditor>,
    sessions: Cache<String, Arc<EditSession>>,
}

impl SessionRegistry {
    pub fn new(editor: Arc<dyn ImageEditor>, max_sessions: u64, idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle)
            .eviction_listener(|id: Arc<String>, _session, cause| {
                log::debug!("Session {} evicted ({:?})", id, cause);
            })
            .build();
        Self { editor, sessions }
    }

    pub fn from_config(editor: Arc<dyn ImageEditor>, config: &Config) -> Self {
        Self::new(editor, config.max_sessions, config.session_idle())
    }

    pub async fn session(&self, id: &str) -> Arc<EditSession> {
        let key = id.to_string();
        let editor = self.editor.clone();
        let session_id = key.clone();
        self.sessions
            .get_with(key, async move { Arc::new(EditSession::new(session_id, editor)) })
            .await
    }

    /// A one-off session that is never stored; it goes away with its caller.
    pub fn detached(&self, id: &str) -> EditSession {
        EditSession::new(id, self.editor.clone())
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<EditSession>> {
        self.sessions.remove(id).await
    }

    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EditResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FakeEditor {
        result: std::result::Result<EditResult, String>,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        entered: Notify,
        release: Option<Notify>,
    }

    impl FakeEditor {
        fn returning(result: std::result::Result<EditResult, String>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                entered: Notify::new(),
                release: None,
            })
        }

        fn gated() -> Arc<Self> {
            Arc::new(Self {
                result: Ok(EditResult {
                    image_url: Some("data:image/png;base64,QUJD".into()),
                    text: None,
                }),
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Some(Notify::new()),
            })
        }
    }

    #[async_trait]
    impl ImageEditor for FakeEditor {
        async fn submit_edit(&self, _image: &ImageResource, _instruction: &str) -> Result<EditResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.result.clone().map_err(EditError::Adapter)
        }
    }

    fn png() -> ImageResource {
        ImageResource::from_bytes(b"hello".to_vec(), "image/png")
    }

    #[tokio::test]
    async fn test_successful_edit() {
        let editor = FakeEditor::returning(Ok(EditResult {
            image_url: Some("data:image/png;base64,QUJD".into()),
            text: Some("done".into()),
        }));
        let session = EditSession::new("s1", editor.clone());

        let outcome = session.edit(png(), "add a hat").await.unwrap();
        assert!(matches!(outcome, Outcome::Edited(_)));
        assert_eq!(session.state().as_str(), "succeeded");
        assert_eq!(editor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_and_failed_outcomes_are_distinct() {
        let empty = EditSession::new("e", FakeEditor::returning(Ok(EditResult::default())));
        assert_eq!(empty.edit(png(), "x").await.unwrap(), Outcome::Empty);

        let failing = EditSession::new("f", FakeEditor::returning(Err("offline".into())));
        let outcome = failing.edit(png(), "x").await.unwrap();
        assert_eq!(outcome, Outcome::Failed("offline".into()));
        assert_eq!(failing.state(), OperationState::Failed("offline".into()));
    }

    #[tokio::test]
    async fn test_validation_never_reaches_editor() {
        let editor = FakeEditor::returning(Ok(EditResult::default()));
        let session = EditSession::new("v", editor.clone());

        assert!(matches!(session.submit().await, Err(EditError::Validation(_))));

        let text_file = ImageResource::from_bytes(b"notes".to_vec(), "text/plain");
        assert!(matches!(
            session.select_image(text_file),
            Err(EditError::Validation(_))
        ));

        session.select_image(png()).unwrap();
        session.set_instruction("   ");
        assert!(!session.can_submit());
        assert!(session.submit().await.is_err());

        assert_eq!(editor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.state(), OperationState::Idle);
    }

    #[tokio::test]
    async fn test_second_submission_rejected_while_in_flight() {
        let editor = FakeEditor::gated();
        let session = Arc::new(EditSession::new("busy", editor.clone()));
        session.select_image(png()).unwrap();
        session.set_instruction("add a hat");

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.submit().await })
        };
        editor.entered.notified().await;

        assert!(session.state().is_in_flight());
        assert!(!session.can_submit());
        assert!(matches!(session.submit().await, Err(EditError::Busy)));
        assert!(matches!(session.select_image(png()), Err(EditError::Busy)));

        editor.release.as_ref().unwrap().notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Edited(_)));

        assert_eq!(editor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(editor.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_selection_clears_previous_result() {
        let session = EditSession::new("c", FakeEditor::returning(Err("boom".into())));
        session.edit(png(), "x").await.unwrap();
        assert!(session.outcome().is_some());

        session.select_image(png()).unwrap();
        assert_eq!(session.state(), OperationState::Idle);
        assert!(session.outcome().is_none());
    }

    #[tokio::test]
    async fn test_dropped_submission_frees_the_slot() {
        let editor = FakeEditor::gated();
        let session = EditSession::new("cancel", editor.clone());
        session.select_image(png()).unwrap();
        session.set_instruction("add a hat");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), session.submit()).await;
        assert!(timed_out.is_err());
        assert_eq!(
            session.state(),
            OperationState::Failed("request cancelled".into())
        );
        assert!(session.can_submit());

        editor.release.as_ref().unwrap().notify_one();
        let outcome = session.submit().await.unwrap();
        assert!(matches!(outcome, Outcome::Edited(_)));
        assert_eq!(editor.calls.load(Ordering::SeqCst), 2);
    }

    fn registry(max_sessions: u64, idle: Duration) -> SessionRegistry {
        SessionRegistry::new(
            FakeEditor::returning(Ok(EditResult::default())),
            max_sessions,
            idle,
        )
    }

    #[tokio::test]
    async fn test_registry_reuses_sessions() {
        let registry = registry(100, Duration::from_secs(60));
        let a = registry.session("alice").await;
        let again = registry.session("alice").await;
        let b = registry.session("bob").await;

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);

        registry.remove("alice").await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let registry = registry(100, Duration::from_millis(50));
        let first = registry.session("alice").await;
        assert_eq!(registry.len().await, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.is_empty().await);

        let fresh = registry.session("alice").await;
        assert!(!Arc::ptr_eq(&first, &fresh));
    }

    #[tokio::test]
    async fn test_registry_is_capped() {
        let registry = registry(10, Duration::from_secs(60));
        for i in 0..200 {
            registry.session(&format!("caller-{}", i)).await;
        }
        assert!(registry.len().await <= 10);
    }

    #[tokio::test]
    async fn test_detached_session_is_not_stored() {
        let registry = registry(10, Duration::from_secs(60));
        let session = registry.detached("anonymous");
        session.edit(png(), "add a hat").await.unwrap();

        assert_eq!(session.id(), "anonymous");
        assert!(registry.is_empty().await);
    }
}
