use exchange_core::{ParticipantId, Phase};

use super::{Exchange, ExchangeResult};
use crate::store::AssignmentDetails;

impl Exchange {
    /// The giver's receiver and the receiver's wishlist, once the exchange
    /// has been shuffled. `None` while open or for unknown givers.
    pub fn assignment_for(
        &self,
        giver_id: ParticipantId,
    ) -> ExchangeResult<Option<AssignmentDetails>> {
        if self.store.app_state()?.phase() == Phase::Open {
            return Ok(None);
        }
        self.store.assignment_for_giver(giver_id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use exchange_core::ParticipantId;

    #[tokio::test]
    async fn nothing_before_shuffle() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b", "c"]).await;
        assert!(exchange.assignment_for(ids[0]).unwrap().is_none());
    }

    #[tokio::test]
    async fn joins_receiver_and_wishlist() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b", "c"]).await;
        let assignments = exchange.shuffle(&admin_ctx(), None).await.unwrap();

        for giver in &ids {
            let details = exchange.assignment_for(*giver).unwrap().unwrap();
            let expected = assignments
                .iter()
                .find(|a| a.giver_id == *giver)
                .unwrap()
                .receiver_id;
            assert_eq!(details.assignment.receiver_id, expected);
            assert_eq!(details.receiver.id, expected);
            assert_ne!(details.receiver.id, *giver);
            assert_eq!(
                details.wishlist.and_then(|w| w.item1),
                Some("gift".to_string())
            );
        }

        assert!(exchange.assignment_for(ParticipantId(1)).unwrap().is_none());
        assert!(exchange.assignment_for(ParticipantId(99)).unwrap().is_none());
    }

    #[tokio::test]
    async fn receiver_wishlist_edits_show_through() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b", "c"]).await;
        exchange.shuffle(&admin_ctx(), None).await.unwrap();

        let receiver = exchange.assignment_for(ids[0]).unwrap().unwrap().receiver.id;
        exchange
            .save_wishlist(receiver, Some("kite"), None, None)
            .await
            .unwrap();
        let details = exchange.assignment_for(ids[0]).unwrap().unwrap();
        assert_eq!(details.wishlist.and_then(|w| w.item1).as_deref(), Some("kite"));
    }

    #[tokio::test]
    async fn nothing_after_reset() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b", "c"]).await;
        exchange.shuffle(&admin_ctx(), None).await.unwrap();
        exchange.reset(&admin_ctx()).await.unwrap();
        assert!(exchange.assignment_for(ids[0]).unwrap().is_none());
    }
}
