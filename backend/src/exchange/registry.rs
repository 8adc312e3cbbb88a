use exchange_core::{AppState, Credential, ExchangeError, Participant, ParticipantId, Role};
use tracing::info;

use super::{Exchange, ExchangeResult};
use crate::auth::RequestContext;
use crate::store::{NewParticipant, RosterEntry};

impl Exchange {
    /// Makes `username` the one and only admin, creating it if needed, and
    /// sets its credential to `credential`. Runs at start-up, so it takes the
    /// admin lock without a caller check.
    ///
    /// Changing who is admin while shuffled is `InvalidState` and leaves the
    /// store as it was; refreshing the credential of the current admin is
    /// always allowed.
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        credential: Credential,
    ) -> ExchangeResult<Participant> {
        let _guard = self.admin_lock.lock().await;

        let name = username.to_string();
        let admin = self
            .blocking(move |store| store.normalize_admin(&name, credential))
            .await?;
        info!(id = %admin.id, username, "admin ready");
        Ok(admin)
    }

    pub async fn create_participant(
        &self,
        ctx: &RequestContext,
        username: &str,
        credential: &str,
    ) -> ExchangeResult<Participant> {
        let _guard = self.admin(ctx, "create participant").await?;

        let username = username.trim();
        let credential = credential.trim();
        if username.is_empty() {
            return Err(ExchangeError::Validation("username is required".into()));
        }
        if credential.is_empty() {
            return Err(ExchangeError::Validation("credential is required".into()));
        }
        self.store.app_state()?.phase().ensure_roster_mutable()?;

        let new = NewParticipant {
            username: username.to_string(),
            credential: Credential::new(credential),
            role: Role::Participant,
        };
        let participant = self
            .blocking(move |store| store.insert_participant(new))
            .await?;
        info!(id = %participant.id, username, "participant created");
        Ok(participant)
    }

    pub async fn delete_participant(
        &self,
        ctx: &RequestContext,
        id: ParticipantId,
    ) -> ExchangeResult<()> {
        let _guard = self.admin(ctx, "delete participant").await?;

        self.store.app_state()?.phase().ensure_roster_mutable()?;
        let participant = self
            .store
            .participant(id)?
            .ok_or_else(|| ExchangeError::participant_not_found(id))?;
        if participant.is_admin() {
            return Err(ExchangeError::Validation(
                "the admin participant cannot be deleted".into(),
            ));
        }

        self.blocking(move |store| store.remove_participant(id)).await?;
        info!(%id, username = %participant.username, "participant deleted");
        Ok(())
    }

    /// Non-admin participants in creation order, with their wishlists.
    pub fn list_participants(&self) -> ExchangeResult<Vec<RosterEntry>> {
        self.store.roster()
    }

    pub fn app_state(&self) -> ExchangeResult<AppState> {
        self.store.app_state()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Policy;
    use exchange_core::{Credential, ErrorKind, ParticipantId, Phase, Role};

    #[tokio::test]
    async fn create_lists_in_creation_order() {
        let exchange = exchange().await;
        join(&exchange, "alice").await;
        join(&exchange, "bob").await;

        let roster = exchange.list_participants().unwrap();
        let names: Vec<_> = roster
            .iter()
            .map(|r| r.participant.username.as_str())
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(roster
            .iter()
            .all(|r| !r.participant.wishlist_completed && r.wishlist.is_none()));
        assert!(roster.iter().all(|r| r.participant.role == Role::Participant));
    }

    #[tokio::test]
    async fn usernames_are_unique_and_case_sensitive() {
        let exchange = exchange().await;
        join(&exchange, "alice").await;

        let err = exchange
            .create_participant(&admin_ctx(), "alice", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert!(exchange
            .create_participant(&admin_ctx(), "Alice", "pw")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let exchange = exchange().await;
        let err = exchange
            .create_participant(&admin_ctx(), "   ", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = exchange
            .create_participant(&admin_ctx(), "carol", "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn admin_operations_need_admin() {
        let exchange = exchange().await;
        let err = exchange
            .create_participant(&guest_ctx(), "mallory", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let alice = join(&exchange, "alice").await;
        let err = exchange
            .delete_participant(&guest_ctx(), alice.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn admin_cannot_be_deleted_and_unknown_ids_are_not_found() {
        let exchange = exchange().await;
        let err = exchange
            .delete_participant(&admin_ctx(), ParticipantId(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = exchange
            .delete_participant(&admin_ctx(), ParticipantId(404))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_wishlist() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b"]).await;
        exchange.delete_participant(&admin_ctx(), ids[0]).await.unwrap();

        assert_eq!(exchange.wishlist(ids[0]).unwrap(), None);
        assert_eq!(exchange.list_participants().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn roster_is_frozen_while_shuffled() {
        let exchange = exchange().await;
        let ids = ready_roster(&exchange, &["a", "b", "c"]).await;
        exchange.shuffle(&admin_ctx(), None).await.unwrap();

        let err = exchange
            .create_participant(&admin_ctx(), "late", "pw")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = exchange
            .delete_participant(&admin_ctx(), ids[1])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_and_normalizes_roles() {
        let exchange = exchange_with(Policy::default());
        let first = exchange
            .bootstrap_admin("admin", Credential::new("x"))
            .await
            .unwrap();
        let again = exchange
            .bootstrap_admin("admin", Credential::new("x"))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);

        join(&exchange, "santa").await;
        let santa = exchange
            .bootstrap_admin("santa", Credential::new("y"))
            .await
            .unwrap();
        assert!(santa.is_admin());

        // The previous admin is now an ordinary participant on the roster.
        let roster = exchange.list_participants().unwrap();
        let names: Vec<_> = roster
            .iter()
            .map(|r| r.participant.username.as_str())
            .collect();
        assert_eq!(names, vec!["admin"]);
    }

    #[tokio::test]
    async fn bootstrap_of_new_admin_while_shuffled_changes_nothing() {
        let exchange = exchange().await;
        ready_roster(&exchange, &["a", "b", "c"]).await;
        exchange.shuffle(&admin_ctx(), None).await.unwrap();

        let err = exchange
            .bootstrap_admin("root", Credential::new("changeme"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = exchange
            .bootstrap_admin("a", Credential::new("changeme"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        // The configured admin still starts up cleanly afterwards.
        let admin = exchange
            .bootstrap_admin(ADMIN, Credential::new("changeme"))
            .await
            .unwrap();
        assert_eq!(admin.username, ADMIN);
        let roster = exchange.list_participants().unwrap();
        let names: Vec<_> = roster
            .iter()
            .map(|r| r.participant.username.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(exchange.list_assignments(&admin_ctx()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn bootstrap_refreshes_the_admin_credential() {
        let exchange = exchange().await;
        ready_roster(&exchange, &["a", "b", "c"]).await;
        exchange.shuffle(&admin_ctx(), None).await.unwrap();

        let admin = exchange
            .bootstrap_admin(ADMIN, Credential::new("rotated"))
            .await
            .unwrap();
        assert_eq!(admin.credential, Credential::new("rotated"));
        assert_eq!(exchange.app_state().unwrap().phase(), Phase::Shuffled);
    }
}
