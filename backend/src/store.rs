//! Repository seams and the snapshot-backed store behind them.
//!
//! Every write goes through [`MemoryStore::write`], which stages a copy of the
//! tables, applies the change, persists the copy when a snapshot file is
//! configured, and only then publishes it. Readers never see half a batch.
//!
//! Writers queue on their own mutex; the table lock is only taken for the
//! final swap, so reads are never held up by snapshot I/O. Writes still do
//! blocking file I/O and callers on an async runtime should run them on a
//! blocking thread.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use exchange_core::{
    AppState, Assignment, Credential, ExchangeError, Participant, ParticipantId, Phase, Role,
    WishlistEntry,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub type StoreResult<T> = Result<T, ExchangeError>;

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub username: String,
    pub credential: Credential,
    pub role: Role,
}

/// A roster row joined with its wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub participant: Participant,
    pub wishlist: Option<WishlistEntry>,
}

/// An assignment joined with the receiver and the receiver's wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentDetails {
    pub assignment: Assignment,
    pub receiver: Participant,
    pub wishlist: Option<WishlistEntry>,
}

pub trait ParticipantRepository: Send + Sync {
    /// Fails `Conflict` when the username is taken (case-sensitive).
    fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant>;
    fn participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>>;
    fn participant_by_username(&self, username: &str) -> StoreResult<Option<Participant>>;
    /// Every participant, admins included, in creation order.
    fn participants(&self) -> StoreResult<Vec<Participant>>;
    /// Non-admin participants in creation order, each with its wishlist.
    fn roster(&self) -> StoreResult<Vec<RosterEntry>>;
    /// Removes the participant together with its wishlist and any
    /// assignment rows naming it.
    fn remove_participant(&self, id: ParticipantId) -> StoreResult<Participant>;
    /// Leaves `username` as the only admin in one write: creates it or
    /// promotes it, demotes every other admin and stores `credential`.
    /// Role changes alter the roster, so they fail `InvalidState` while
    /// shuffled and nothing is written.
    fn normalize_admin(&self, username: &str, credential: Credential) -> StoreResult<Participant>;
}

pub trait WishlistRepository: Send + Sync {
    fn wishlist(&self, participant_id: ParticipantId) -> StoreResult<Option<WishlistEntry>>;
    /// Replaces the owner's entry wholesale and marks their wishlist complete.
    /// With `allow_when_shuffled` false the save fails `InvalidState` if the
    /// exchange is shuffled at the moment of the write.
    fn save_wishlist(
        &self,
        entry: WishlistEntry,
        allow_when_shuffled: bool,
    ) -> StoreResult<WishlistEntry>;
}

pub trait AssignmentRepository: Send + Sync {
    fn app_state(&self) -> StoreResult<AppState>;
    fn assignments(&self) -> StoreResult<Vec<Assignment>>;
    fn assignment_for_giver(&self, giver_id: ParticipantId)
        -> StoreResult<Option<AssignmentDetails>>;
    /// Replaces every assignment row with `batch`, then sets
    /// `shuffle_completed`, as one atomic write.
    fn commit_assignments(&self, batch: Vec<Assignment>) -> StoreResult<()>;
    /// Deletes every assignment row, then clears `shuffle_completed`, as one
    /// atomic write.
    fn clear_assignments(&self) -> StoreResult<()>;
}

pub trait ExchangeStore: ParticipantRepository + WishlistRepository + AssignmentRepository {}

impl<T> ExchangeStore for T where
    T: ParticipantRepository + WishlistRepository + AssignmentRepository
{
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tables {
    next_id: u64,
    participants: Vec<Participant>,
    wishlist_items: Vec<WishlistEntry>,
    assignments: Vec<Assignment>,
    app_state: AppState,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            next_id: 1,
            participants: Vec::new(),
            wishlist_items: Vec::new(),
            assignments: Vec::new(),
            app_state: AppState::default(),
        }
    }
}

impl Tables {
    fn participant_mut(&mut self, id: ParticipantId) -> StoreResult<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ExchangeError::participant_not_found(id))
    }

    fn wishlist(&self, id: ParticipantId) -> Option<&WishlistEntry> {
        self.wishlist_items.iter().find(|w| w.participant_id == id)
    }

    fn push_participant(&mut self, new: NewParticipant) -> Participant {
        let participant = Participant {
            id: ParticipantId(self.next_id),
            username: new.username,
            credential: new.credential,
            role: new.role,
            wishlist_completed: false,
        };
        self.next_id += 1;
        self.participants.push(participant.clone());
        participant
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    writer: Mutex<()>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a store backed by a JSON snapshot. A missing file starts empty;
    /// an unreadable or corrupt one is an error.
    pub fn with_persistence(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Tables>(&bytes).map_err(|err| {
                ExchangeError::Internal(format!("corrupt snapshot {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tables::default(),
            Err(err) => {
                return Err(ExchangeError::Internal(format!(
                    "cannot read snapshot {}: {err}",
                    path.display()
                )))
            }
        };
        info!(
            path = %path.display(),
            participants = tables.participants.len(),
            "store opened"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            writer: Mutex::new(()),
            persist_path: Some(path),
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let tables = self
            .tables
            .read()
            .map_err(|e| ExchangeError::Internal(format!("store lock poisoned: {e}")))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let _writer = self
            .writer
            .lock()
            .map_err(|e| ExchangeError::Internal(format!("store writer poisoned: {e}")))?;
        let mut staged = self.read(Tables::clone)?;
        let out = f(&mut staged)?;
        if let Some(path) = &self.persist_path {
            persist(path, &staged).map_err(|err| {
                error!(path = %path.display(), %err, "persist error");
                err
            })?;
        }
        *self
            .tables
            .write()
            .map_err(|e| ExchangeError::Internal(format!("store lock poisoned: {e}")))? = staged;
        Ok(out)
    }
}

fn persist(path: &Path, tables: &Tables) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(tables)
        .map_err(|err| ExchangeError::Internal(format!("cannot encode snapshot: {err}")))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|err| {
            ExchangeError::Internal(format!("cannot write snapshot {}: {err}", path.display()))
        })
}

impl ParticipantRepository for MemoryStore {
    fn insert_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        self.write(|t| {
            if t.participants.iter().any(|p| p.username == new.username) {
                return Err(ExchangeError::Conflict(format!(
                    "username '{}' is already taken",
                    new.username
                )));
            }
            Ok(t.push_participant(new))
        })
    }

    fn participant(&self, id: ParticipantId) -> StoreResult<Option<Participant>> {
        self.read(|t| t.participants.iter().find(|p| p.id == id).cloned())
    }

    fn participant_by_username(&self, username: &str) -> StoreResult<Option<Participant>> {
        self.read(|t| t.participants.iter().find(|p| p.username == username).cloned())
    }

    fn participants(&self) -> StoreResult<Vec<Participant>> {
        self.read(|t| t.participants.clone())
    }

    fn roster(&self) -> StoreResult<Vec<RosterEntry>> {
        self.read(|t| {
            t.participants
                .iter()
                .filter(|p| !p.is_admin())
                .map(|p| RosterEntry {
                    participant: p.clone(),
                    wishlist: t.wishlist(p.id).cloned(),
                })
                .collect()
        })
    }

    fn remove_participant(&self, id: ParticipantId) -> StoreResult<Participant> {
        self.write(|t| {
            let index = t
                .participants
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| ExchangeError::participant_not_found(id))?;
            let removed = t.participants.remove(index);
            t.wishlist_items.retain(|w| w.participant_id != id);
            t.assignments
                .retain(|a| a.giver_id != id && a.receiver_id != id);
            if t.assignments.is_empty() {
                t.app_state.shuffle_completed = false;
            }
            Ok(removed)
        })
    }

    fn normalize_admin(&self, username: &str, credential: Credential) -> StoreResult<Participant> {
        self.write(|t| {
            let target = t.participants.iter().position(|p| p.username == username);
            let roster_changes = t.participants.iter().enumerate().any(|(i, p)| {
                if Some(i) == target {
                    !p.is_admin()
                } else {
                    p.is_admin()
                }
            });
            if roster_changes {
                t.app_state.phase().ensure_roster_mutable()?;
            }

            for (i, p) in t.participants.iter_mut().enumerate() {
                if Some(i) == target {
                    p.role = Role::Admin;
                    p.credential = credential.clone();
                } else if p.is_admin() {
                    p.role = Role::Participant;
                }
            }
            Ok(match target {
                Some(i) => t.participants[i].clone(),
                None => t.push_participant(NewParticipant {
                    username: username.to_string(),
                    credential,
                    role: Role::Admin,
                }),
            })
        })
    }
}

impl WishlistRepository for MemoryStore {
    fn wishlist(&self, participant_id: ParticipantId) -> StoreResult<Option<WishlistEntry>> {
        self.read(|t| t.wishlist(participant_id).cloned())
    }

    fn save_wishlist(
        &self,
        entry: WishlistEntry,
        allow_when_shuffled: bool,
    ) -> StoreResult<WishlistEntry> {
        self.write(|t| {
            if !allow_when_shuffled && t.app_state.phase() == Phase::Shuffled {
                return Err(ExchangeError::InvalidState(
                    "wishlists are locked once assignments exist".into(),
                ));
            }
            t.participant_mut(entry.participant_id)?.wishlist_completed = true;
            match t
                .wishlist_items
                .iter_mut()
                .find(|w| w.participant_id == entry.participant_id)
            {
                Some(existing) => *existing = entry.clone(),
                None => t.wishlist_items.push(entry.clone()),
            }
            Ok(entry)
        })
    }
}

impl AssignmentRepository for MemoryStore {
    fn app_state(&self) -> StoreResult<AppState> {
        self.read(|t| t.app_state)
    }

    fn assignments(&self) -> StoreResult<Vec<Assignment>> {
        self.read(|t| t.assignments.clone())
    }

    fn assignment_for_giver(
        &self,
        giver_id: ParticipantId,
    ) -> StoreResult<Option<AssignmentDetails>> {
        self.read(|t| {
            let assignment = *t.assignments.iter().find(|a| a.giver_id == giver_id)?;
            let receiver = t
                .participants
                .iter()
                .find(|p| p.id == assignment.receiver_id)?
                .clone();
            Some(AssignmentDetails {
                assignment,
                wishlist: t.wishlist(receiver.id).cloned(),
                receiver,
            })
        })
    }

    fn commit_assignments(&self, batch: Vec<Assignment>) -> StoreResult<()> {
        self.write(|t| {
            t.assignments = batch;
            t.app_state.shuffle_completed = !t.assignments.is_empty();
            Ok(())
        })
    }

    fn clear_assignments(&self) -> StoreResult<()> {
        self.write(|t| {
            t.assignments.clear();
            t.app_state.shuffle_completed = false;
            Ok(())
        })
    }
}
