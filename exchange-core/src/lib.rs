use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Smallest roster a shuffle will accept.
pub const MIN_ROSTER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque login secret. Verification belongs to whoever authenticates
/// participants; this crate only stores and compares it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub username: String,
    pub credential: Credential,
    pub role: Role,
    pub wishlist_completed: bool,
}

impl Participant {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WishlistEntry {
    pub participant_id: ParticipantId,
    pub item1: Option<String>,
    pub item2: Option<String>,
    pub item3: Option<String>,
}

impl WishlistEntry {
    /// Builds an entry from raw form input. Every item is trimmed and blank
    /// items become `None`; at least one item must survive.
    pub fn new(
        participant_id: ParticipantId,
        item1: Option<&str>,
        item2: Option<&str>,
        item3: Option<&str>,
    ) -> Result<Self, ExchangeError> {
        let entry = Self {
            participant_id,
            item1: normalize_item(item1),
            item2: normalize_item(item2),
            item3: normalize_item(item3),
        };
        if entry.items().next().is_none() {
            return Err(ExchangeError::Validation(
                "at least one gift idea is required".into(),
            ));
        }
        Ok(entry)
    }

    pub fn items(&self) -> impl Iterator<Item = &str> {
        [&self.item1, &self.item2, &self.item3]
            .into_iter()
            .filter_map(|item| item.as_deref())
    }
}

fn normalize_item(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub giver_id: ParticipantId,
    pub receiver_id: ParticipantId,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppState {
    pub shuffle_completed: bool,
}

impl AppState {
    pub fn phase(&self) -> Phase {
        if self.shuffle_completed {
            Phase::Shuffled
        } else {
            Phase::Open
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Open,
    Shuffled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    ShuffleCommitted,
    Reset,
}

impl Phase {
    /// `Open -> Shuffled` on a committed shuffle, anything `-> Open` on reset.
    pub fn apply(self, event: PhaseEvent) -> Result<Phase, ExchangeError> {
        match (self, event) {
            (Phase::Open, PhaseEvent::ShuffleCommitted) => Ok(Phase::Shuffled),
            (Phase::Shuffled, PhaseEvent::ShuffleCommitted) => Err(already_shuffled()),
            (_, PhaseEvent::Reset) => Ok(Phase::Open),
        }
    }

    /// Participants may only be added or removed while the exchange is open.
    pub fn ensure_roster_mutable(self) -> Result<(), ExchangeError> {
        match self {
            Phase::Open => Ok(()),
            Phase::Shuffled => Err(ExchangeError::InvalidState(
                "roster is frozen while assignments exist; reset first".into(),
            )),
        }
    }
}

fn already_shuffled() -> ExchangeError {
    ExchangeError::InvalidState(
        "assignments already generated; reset before shuffling again".into(),
    )
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    InvalidState,
    NotFound,
    Unauthorized,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn participant_not_found(id: ParticipantId) -> Self {
        Self::NotFound(format!("participant {id} not found"))
    }
}

/// Checks everything a shuffle needs before any randomness is drawn.
/// Admin rows are ignored if the caller passes them in.
pub fn check_shuffle_preconditions(
    phase: Phase,
    roster: &[Participant],
) -> Result<(), ExchangeError> {
    if phase == Phase::Shuffled {
        return Err(already_shuffled());
    }

    let eligible: Vec<&Participant> = roster.iter().filter(|p| !p.is_admin()).collect();
    if eligible.len() < MIN_ROSTER {
        return Err(ExchangeError::InvalidState(format!(
            "at least {MIN_ROSTER} participants are required, found {}",
            eligible.len()
        )));
    }

    let pending: Vec<&str> = eligible
        .iter()
        .filter(|p| !p.wishlist_completed)
        .map(|p| p.username.as_str())
        .collect();
    if !pending.is_empty() {
        return Err(ExchangeError::InvalidState(format!(
            "wishlists not completed: {}",
            pending.join(", ")
        )));
    }

    Ok(())
}

/// Sattolo's shuffle: permutes `items` into a single cycle, so no element
/// stays in place. Only single n-cycles are reachable, which is a strict
/// subset of all derangements.
pub fn sattolo_cycle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..i);
        items.swap(i, j);
    }
}

/// Pairs `ids[k]` with the k-th element of a Sattolo-shuffled copy.
pub fn derange<R: Rng + ?Sized>(
    ids: &[ParticipantId],
    rng: &mut R,
) -> Result<Vec<Assignment>, ExchangeError> {
    if ids.len() < 2 {
        return Err(ExchangeError::InvalidState(format!(
            "cannot derange a roster of {}",
            ids.len()
        )));
    }

    let mut receivers = ids.to_vec();
    sattolo_cycle(&mut receivers, rng);

    Ok(ids
        .iter()
        .zip(receivers)
        .map(|(&giver_id, receiver_id)| Assignment {
            giver_id,
            receiver_id,
        })
        .collect())
}

/// Number of disjoint cycles formed by following giver -> receiver.
/// Rows whose giver never appears as a receiver are not counted.
pub fn count_cycles(assignments: &[Assignment]) -> usize {
    let next: HashMap<ParticipantId, ParticipantId> = assignments
        .iter()
        .map(|a| (a.giver_id, a.receiver_id))
        .collect();
    let mut seen = HashSet::new();
    let mut cycles = 0;

    for start in assignments.iter().map(|a| a.giver_id) {
        if seen.contains(&start) {
            continue;
        }
        let mut current = start;
        loop {
            if !seen.insert(current) {
                break;
            }
            match next.get(&current) {
                Some(&to) if to == start => {
                    seen.insert(to);
                    cycles += 1;
                    break;
                }
                Some(&to) => current = to,
                None => break,
            }
        }
    }

    cycles
}

/// Audits a generated batch against the roster it was drawn from.
pub fn verify_derangement(
    roster: &[ParticipantId],
    assignments: &[Assignment],
) -> Result<(), ExchangeError> {
    let members: HashSet<ParticipantId> = roster.iter().copied().collect();
    if assignments.len() != members.len() {
        return Err(ExchangeError::Internal(format!(
            "expected {} assignments, generated {}",
            members.len(),
            assignments.len()
        )));
    }

    let mut givers = HashSet::new();
    let mut receivers = HashSet::new();
    for a in assignments {
        if a.giver_id == a.receiver_id {
            return Err(ExchangeError::Internal(format!(
                "participant {} assigned to themselves",
                a.giver_id
            )));
        }
        if !members.contains(&a.giver_id) || !members.contains(&a.receiver_id) {
            return Err(ExchangeError::Internal(format!(
                "assignment {} -> {} references a participant outside the roster",
                a.giver_id, a.receiver_id
            )));
        }
        if !givers.insert(a.giver_id) || !receivers.insert(a.receiver_id) {
            return Err(ExchangeError::Internal(format!(
                "participant appears twice in assignment {} -> {}",
                a.giver_id, a.receiver_id
            )));
        }
    }

    if count_cycles(assignments) != 1 {
        return Err(ExchangeError::Internal(
            "assignments do not form a single cycle".into(),
        ));
    }

    Ok(())
}
