use exchange_core::{
    check_shuffle_preconditions, derange, verify_derangement, Assignment, ExchangeError,
    Participant, ParticipantId, PhaseEvent,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use super::{Exchange, ExchangeResult};
use crate::auth::RequestContext;

impl Exchange {
    /// Draws and commits a full giver -> receiver cycle over the roster.
    ///
    /// The roster is read, deranged, audited and committed while holding the
    /// admin lock. The batch and the `Shuffled` flag land in one store write.
    /// A `seed` makes the draw reproducible; without one the service RNG is
    /// used.
    pub async fn shuffle(
        &self,
        ctx: &RequestContext,
        seed: Option<u64>,
    ) -> ExchangeResult<Vec<Assignment>> {
        let _guard = self.admin(ctx, "shuffle").await?;

        let phase = self.store.app_state()?.phase();
        let roster: Vec<Participant> = self
            .store
            .roster()?
            .into_iter()
            .map(|entry| entry.participant)
            .collect();
        check_shuffle_preconditions(phase, &roster)?;
        let next = phase.apply(PhaseEvent::ShuffleCommitted)?;

        let ids: Vec<ParticipantId> = roster.iter().map(|p| p.id).collect();
        let assignments = match seed {
            Some(seed) => derange(&ids, &mut ChaCha8Rng::seed_from_u64(seed))?,
            None => {
                let mut rng = self
                    .rng
                    .lock()
                    .map_err(|e| ExchangeError::Internal(format!("rng lock poisoned: {e}")))?;
                derange(&ids, &mut *rng)?
            }
        };
        verify_derangement(&ids, &assignments)?;

        let batch = assignments.clone();
        self.blocking(move |store| store.commit_assignments(batch)).await?;
        info!(
            participants = ids.len(),
            seeded = seed.is_some(),
            phase = ?next,
            "shuffle committed"
        );
        Ok(assignments)
    }

    /// Clears every assignment and reopens the exchange. Resetting an open
    /// exchange succeeds without changing anything.
    pub async fn reset(&self, ctx: &RequestContext) -> ExchangeResult<()> {
        let _guard = self.admin(ctx, "reset").await?;

        let next = self.store.app_state()?.phase().apply(PhaseEvent::Reset)?;
        self.blocking(|store| store.clear_assignments()).await?;
        info!(phase = ?next, "exchange reset");
        Ok(())
    }

    /// The committed giver -> receiver set for admin audits. Empty when open.
    pub async fn list_assignments(&self, ctx: &RequestContext) -> ExchangeResult<Vec<Assignment>> {
        if !self.boundary.is_admin(ctx) {
            return Err(ExchangeError::Unauthorized(
                "list assignments requires admin access".into(),
            ));
        }
        self.store.assignments()
    }
}
