use super::PtySession;
use anyhow::anyhow;
use flotilla_domain::WorkstreamId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<WorkstreamId, Arc<PtySession>>,
    focused: Option<WorkstreamId>,
}

/// Live PTY sessions by workstream, plus the session that receives user input.
#[derive(Clone, Default)]
pub struct PtyRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl PtyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `session`, returning the session it replaced. The first
    /// session registered becomes the input target.
    pub fn insert(&self, session: Arc<PtySession>) -> Option<Arc<PtySession>> {
        let mut inner = self.lock();
        let id = session.workstream_id().clone();
        if inner.focused.is_none() {
            inner.focused = Some(id.clone());
        }
        inner.sessions.insert(id, session)
    }

    pub fn remove(&self, workstream_id: &WorkstreamId) -> Option<Arc<PtySession>> {
        let mut inner = self.lock();
        if inner.focused.as_ref() == Some(workstream_id) {
            inner.focused = None;
        }
        inner.sessions.remove(workstream_id)
    }

    /// Drops the entry only if its session already closed, so a newer session
    /// for the same workstream survives a late close report.
    pub fn remove_if_closed(&self, workstream_id: &WorkstreamId) {
        let mut inner = self.lock();
        let closed = inner
            .sessions
            .get(workstream_id)
            .is_some_and(|session| session.is_closed());
        if closed {
            inner.sessions.remove(workstream_id);
            if inner.focused.as_ref() == Some(workstream_id) {
                inner.focused = None;
            }
        }
    }

    pub fn get(&self, workstream_id: &WorkstreamId) -> Option<Arc<PtySession>> {
        self.lock().sessions.get(workstream_id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<PtySession>> {
        self.lock().sessions.values().cloned().collect()
    }

    pub fn drain(&self) -> Vec<Arc<PtySession>> {
        let mut inner = self.lock();
        inner.focused = None;
        inner.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn focus(&self, workstream_id: &WorkstreamId) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if !inner.sessions.contains_key(workstream_id) {
            return Err(anyhow!("no pty session for {workstream_id}"));
        }
        inner.focused = Some(workstream_id.clone());
        Ok(())
    }

    pub fn focused(&self) -> Option<WorkstreamId> {
        self.lock().focused.clone()
    }

    /// Writes to the focused session.
    pub fn send(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let target = {
            let inner = self.lock();
            inner
                .focused
                .as_ref()
                .and_then(|id| inner.sessions.get(id))
                .cloned()
        };
        let session = target.ok_or_else(|| anyhow!("no focused pty session"))?;
        session.write(bytes)
    }
}
