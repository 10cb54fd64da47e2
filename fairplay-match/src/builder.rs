use crate::commitment;
use crate::record::storage_key;
use fairplay_core::{Action, ActionRequest, Address, MatchId, Result, StorageKey, TxParams};
use std::str::FromStr;

/// Unsigned requests for one protocol step plus the keys they touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltAction {
    pub requests: Vec<ActionRequest>,
    pub keys: Vec<StorageKey>,
}

/// Produces unsigned action requests against one application.
///
/// Network parameters are passed in, so building never does I/O.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    app_id: u64,
    params: TxParams,
}

impl RequestBuilder {
    pub fn new(app_id: u64, params: TxParams) -> Self {
        Self { app_id, params }
    }

    fn single(&self, sender: Address, key: StorageKey, action: Action) -> BuiltAction {
        BuiltAction {
            requests: vec![self.request(sender, key.clone(), action)],
            keys: vec![key],
        }
    }

    fn request(&self, sender: Address, key: StorageKey, action: Action) -> ActionRequest {
        ActionRequest {
            sender,
            app_id: self.app_id,
            params: self.params.clone(),
            action,
            boxes: vec![key],
            group: None,
        }
    }

    /// `predicted_match_id` comes from an optimistic counter read and is only
    /// trustworthy once the created record has been read back.
    pub fn build_create(
        &self,
        sender: Address,
        wager: u64,
        predicted_match_id: MatchId,
    ) -> BuiltAction {
        self.single(
            sender,
            storage_key(predicted_match_id),
            Action::Create { wager },
        )
    }

    pub fn build_join(&self, sender: Address, match_id: MatchId) -> BuiltAction {
        self.single(sender, storage_key(match_id), Action::Join { match_id })
    }

    /// Parses a user-supplied id before building, so bad input never reaches the network.
    pub fn build_join_str(&self, sender: Address, match_id: &str) -> Result<BuiltAction> {
        Ok(self.build_join(sender, MatchId::from_str(match_id)?))
    }

    pub fn build_commit(
        &self,
        sender: Address,
        match_id: MatchId,
        move_label: &str,
        secret: &str,
    ) -> BuiltAction {
        let commitment = commitment::commit(move_label, secret);
        self.single(
            sender,
            storage_key(match_id),
            Action::Commit {
                match_id,
                commitment,
            },
        )
    }

    /// Must use the same move and secret as the earlier commit.
    pub fn build_reveal(
        &self,
        sender: Address,
        match_id: MatchId,
        move_label: &str,
        secret: &str,
    ) -> BuiltAction {
        self.single(
            sender,
            storage_key(match_id),
            Action::Reveal {
                match_id,
                move_label: move_label.to_string(),
                secret: secret.to_string(),
            },
        )
    }

    pub fn build_resolve(&self, sender: Address, match_id: MatchId) -> BuiltAction {
        self.single(sender, storage_key(match_id), Action::Resolve { match_id })
    }

    /// Reveal followed by resolve, meant to be submitted as one atomic group.
    pub fn build_reveal_and_resolve(
        &self,
        sender: Address,
        match_id: MatchId,
        move_label: &str,
        secret: &str,
    ) -> BuiltAction {
        let mut built = self.build_reveal(sender, match_id, move_label, secret);
        let resolve = self.build_resolve(sender, match_id);
        built.requests.extend(resolve.requests);
        built
    }
}
