//! Client Sessions
//!
//! A [`ClientSession`] is the server-side state of one logged-in client:
//! its key, its name, the outbox of its connection, and its place in the
//! social graph (who follows it, whom it follows, and its timeline).
//!
//! The immutable parts (key, name, connection) are plain fields. The social
//! state sits behind a per-session mutex so that the registry can hand out
//! `Arc<ClientSession>` snapshots without exposing its table.

use crate::connection::ConnectionHandle;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of entries kept in a timeline unless configured otherwise.
pub const DEFAULT_TIMELINE_CAPACITY: usize = 5;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Unique numeric identity of a client, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(u64);

impl ClientKey {
    /// Derives the key for `name` (64-bit FNV-1a over the name bytes).
    ///
    /// The same name always yields the same key, so lookups by name go
    /// through `ClientKey::from_name` rather than a second index.
    pub fn from_name(name: &str) -> Self {
        let hash = name.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
        ClientKey(hash)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ClientKey {
    fn from(raw: u64) -> Self {
        ClientKey(raw)
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One published message as it appears in a timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Name of the publishing client
    pub author: String,
    /// The message text
    pub message: String,
}

impl TimelineEntry {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }
}

/// Mutable social state of a session.
#[derive(Debug, Default)]
struct SocialState {
    /// Keys of clients following this one
    followers: HashSet<ClientKey>,
    /// Keys of clients this one follows
    following: HashSet<ClientKey>,
    /// Most recent entry first
    timeline: VecDeque<TimelineEntry>,
}

/// Server-side state for one logged-in client.
#[derive(Debug)]
pub struct ClientSession {
    key: ClientKey,
    name: String,
    connection: ConnectionHandle,
    timeline_capacity: usize,
    state: Mutex<SocialState>,
}

impl ClientSession {
    /// Creates a session for `name`, owning the given connection outbox.
    pub fn new(name: impl Into<String>, connection: ConnectionHandle, timeline_capacity: usize) -> Self {
        let name = name.into();
        Self {
            key: ClientKey::from_name(&name),
            name,
            connection,
            timeline_capacity,
            state: Mutex::new(SocialState::default()),
        }
    }

    pub fn key(&self) -> ClientKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The outbox used to push answers to this client.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Adds `follower` to this session's follower set.
    ///
    /// Returns `false` if it was already following.
    pub fn add_follower(&self, follower: ClientKey) -> bool {
        self.state().followers.insert(follower)
    }

    pub fn remove_follower(&self, follower: ClientKey) -> bool {
        self.state().followers.remove(&follower)
    }

    pub fn follower_count(&self) -> usize {
        self.state().followers.len()
    }

    /// Snapshot of the follower set.
    pub fn followers(&self) -> Vec<ClientKey> {
        self.state().followers.iter().copied().collect()
    }

    pub fn add_following(&self, target: ClientKey) -> bool {
        self.state().following.insert(target)
    }

    pub fn remove_following(&self, target: ClientKey) -> bool {
        self.state().following.remove(&target)
    }

    /// Snapshot of the keys this session follows.
    pub fn following(&self) -> Vec<ClientKey> {
        self.state().following.iter().copied().collect()
    }

    /// Records a published message at the head of the timeline, evicting
    /// the oldest entry once the capacity is exceeded.
    pub fn push_timeline(&self, entry: TimelineEntry) {
        let mut state = self.state();
        state.timeline.push_front(entry);
        state.timeline.truncate(self.timeline_capacity);
    }

    /// The timeline, most recent entry first.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        self.state().timeline.iter().cloned().collect()
    }

    // Every critical section leaves the state consistent, so a poisoned
    // lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, SocialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
