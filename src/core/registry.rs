use super::error::PtyError;
use super::session::PtySession;

/// Insertion-ordered `id -> PtySession` mapping, owned solely by the
/// supervisor thread.
///
/// A `Vec` rather than a concurrent map is deliberate: the registry has
/// exactly one caller (the supervisor loop never hands it to another
/// thread), so there is nothing to synchronize, and iteration order needs
/// to match creation order, which a hash-based map would not guarantee
/// without extra bookkeeping. Lookup is O(n), acceptable for the expected
/// handful of concurrent sessions (§4.G).
pub struct SessionRegistry {
    sessions: Vec<PtySession>,
    next_id: u32,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocates the next id and takes ownership of `session`. Ids are
    /// never reused, even after the session they were assigned to is
    /// removed.
    pub fn next_id(&mut self) -> Result<u32, PtyError> {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).ok_or(PtyError::IdOverflow)?;
        Ok(id)
    }

    pub fn insert(&mut self, session: PtySession) {
        self.sessions.push(session);
    }

    pub fn get(&self, id: u32) -> Option<&PtySession> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn remove(&mut self, id: u32) -> Option<PtySession> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        Some(self.sessions.remove(index))
    }

    /// Iterates in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &PtySession> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PtySession> {
        self.sessions.iter_mut()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.sessions.iter().map(|s| s.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
