use exchange_core::{ParticipantId, WishlistEntry};
use tracing::debug;

use super::{Exchange, ExchangeResult};

impl Exchange {
    /// `None` both for participants without a wishlist and for unknown ids.
    pub fn wishlist(
        &self,
        participant_id: ParticipantId,
    ) -> ExchangeResult<Option<WishlistEntry>> {
        self.store.wishlist(participant_id)
    }

    /// Replaces the participant's wishlist and marks it complete. Saving the
    /// same items again is harmless; saving fewer items drops the rest.
    ///
    /// With post-shuffle edits disabled, the phase is checked in the same
    /// store write that saves the entry, so a concurrent shuffle cannot slip
    /// in between.
    pub async fn save_wishlist(
        &self,
        participant_id: ParticipantId,
        item1: Option<&str>,
        item2: Option<&str>,
        item3: Option<&str>,
    ) -> ExchangeResult<WishlistEntry> {
        let entry = WishlistEntry::new(participant_id, item1, item2, item3)?;
        let allow_when_shuffled = self.policy.wishlist_edits_after_shuffle;

        let saved = self
            .blocking(move |store| store.save_wishlist(entry, allow_when_shuffled))
            .await?;
        debug!(participant = %participant_id, items = saved.items().count(), "wishlist saved");
        Ok(saved)
    }
}
