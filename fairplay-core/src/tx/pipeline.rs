use crate::error::{FairPlayError, Result};
use crate::ledger::{LedgerSubmitter, Signer};
use crate::tx::{ActionRequest, GroupId, Receipt};
use sha2::{Digest, Sha512_256};
use std::sync::Arc;

/// Signs, broadcasts and confirms batches of action requests.
///
/// Holds no per-call state; retries are the caller's decision.
pub struct TransactionPipeline<L: ?Sized, S: ?Sized> {
    ledger: Arc<L>,
    signer: Arc<S>,
    max_rounds: u64,
}

impl<L, S> TransactionPipeline<L, S>
where
    L: LedgerSubmitter + ?Sized,
    S: Signer + ?Sized,
{
    pub fn new(ledger: Arc<L>, signer: Arc<S>, max_rounds: u64) -> Self {
        Self {
            ledger,
            signer,
            max_rounds,
        }
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub async fn submit(&self, mut requests: Vec<ActionRequest>, atomic: bool) -> Result<Receipt> {
        if requests.is_empty() {
            return Err(FairPlayError::InvalidRequest(
                "nothing to submit".to_string(),
            ));
        }

        let tags: Vec<&'static str> = requests.iter().map(|r| r.action.tag()).collect();
        let group = if atomic && requests.len() > 1 {
            let group = assign_group(&mut requests);
            tracing::debug!("Bound {:?} into atomic group {}", tags, group);
            Some(group)
        } else {
            None
        };

        let signed = match self.signer.sign(&requests).await {
            Ok(signed) => signed,
            Err(FairPlayError::SigningRejected(reason)) => {
                tracing::warn!("Signer declined {:?}: {}", tags, reason);
                return Err(FairPlayError::SigningRejected(reason));
            }
            Err(e) => {
                tracing::warn!("Signer failed on {:?}: {}", tags, e);
                return Err(FairPlayError::signing_rejected(e.to_string()));
            }
        };

        if signed.len() != requests.len() {
            tracing::warn!(
                "Signer returned {} signatures for {} requests",
                signed.len(),
                requests.len()
            );
            return Err(FairPlayError::signing_rejected(format!(
                "expected {} signed requests, got {}",
                requests.len(),
                signed.len()
            )));
        }

        if signed
            .iter()
            .zip(requests.iter())
            .any(|(s, r)| &s.request != r)
        {
            return Err(FairPlayError::signing_rejected(
                "signer returned altered requests",
            ));
        }
        tracing::debug!("Signed {} request(s)", signed.len());

        let handle = self.ledger.broadcast(&signed).await.map_err(|e| {
            tracing::warn!("Broadcast of {:?} failed: {}", tags, e);
            e
        })?;
        tracing::debug!("Broadcast {:?} as {}", tags, handle.txid);

        let mut receipt = self
            .ledger
            .await_confirmation(&handle, self.max_rounds)
            .await
            .map_err(|e| {
                tracing::warn!("Confirmation of {} failed: {}", handle.txid, e);
                e
            })?;
        receipt.group = group;

        tracing::info!(
            "Confirmed {:?} in round {} ({})",
            tags,
            receipt.confirmed_round,
            receipt.txid
        );
        Ok(receipt)
    }
}

/// Binds `requests` into one all-or-nothing group.
///
/// The id is `SHA-512/256("TG" || id(r1) || id(r2) ...)` over the ungrouped
/// requests, and is written into every member.
pub fn assign_group(requests: &mut [ActionRequest]) -> GroupId {
    let mut hasher = Sha512_256::new();
    hasher.update(b"TG");
    for request in requests.iter_mut() {
        request.group = None;
        hasher.update(request.id());
    }
    let group = GroupId(hasher.finalize().into());
    for request in requests.iter_mut() {
        request.group = Some(group);
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Signer;
    use crate::tx::{Action, ConfirmationHandle, SignedRequest, TxParams};
    use crate::types::{Address, MatchId, StorageKey};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLedger {
        broadcasts: Mutex<Vec<Vec<SignedRequest>>>,
        reject: bool,
        confirm: bool,
    }

    #[async_trait]
    impl LedgerSubmitter for RecordingLedger {
        async fn broadcast(&self, signed: &[SignedRequest]) -> Result<ConfirmationHandle> {
            if self.reject {
                return Err(FairPlayError::broadcast_rejected("overspend"));
            }
            self.broadcasts.lock().unwrap().push(signed.to_vec());
            Ok(ConfirmationHandle {
                txid: signed[0].request.txid(),
                submitted_round: Some(10),
            })
        }

        async fn await_confirmation(
            &self,
            handle: &ConfirmationHandle,
            max_rounds: u64,
        ) -> Result<Receipt> {
            if !self.confirm {
                return Err(FairPlayError::ConfirmationTimeout {
                    txid: handle.txid.clone(),
                    rounds: max_rounds,
                });
            }
            Ok(Receipt {
                txid: handle.txid.clone(),
                confirmed_round: 11,
                group: None,
            })
        }
    }

    enum Mode {
        Sign,
        Decline,
        DropOne,
    }

    struct StubSigner(Mode);

    #[async_trait]
    impl Signer for StubSigner {
        fn address(&self) -> Address {
            Address::new([1; 32])
        }

        async fn sign(&self, requests: &[ActionRequest]) -> Result<Vec<SignedRequest>> {
            let signed: Vec<SignedRequest> = requests
                .iter()
                .map(|r| SignedRequest {
                    request: r.clone(),
                    signer: self.address(),
                    signature: vec![0; 64],
                })
                .collect();
            match self.0 {
                Mode::Sign => Ok(signed),
                Mode::Decline => Err(FairPlayError::signing_rejected("user cancelled")),
                Mode::DropOne => Ok(signed[1..].to_vec()),
            }
        }
    }

    fn request(action: Action) -> ActionRequest {
        ActionRequest {
            sender: Address::new([1; 32]),
            app_id: 5,
            params: TxParams::from_last_round(1000, 1, "localnet"),
            boxes: vec![StorageKey::new(b"match_1".to_vec())],
            action,
            group: None,
        }
    }

    fn reveal_and_resolve() -> Vec<ActionRequest> {
        vec![
            request(Action::Reveal {
                match_id: MatchId(1),
                move_label: "Rock".into(),
                secret: "abc".into(),
            }),
            request(Action::Resolve { match_id: MatchId(1) }),
        ]
    }

    fn pipeline(
        ledger: RecordingLedger,
        mode: Mode,
    ) -> TransactionPipeline<RecordingLedger, StubSigner> {
        TransactionPipeline::new(Arc::new(ledger), Arc::new(StubSigner(mode)), 4)
    }

    #[tokio::test]
    async fn test_atomic_submit_groups_every_member() {
        let ledger = RecordingLedger {
            confirm: true,
            ..Default::default()
        };
        let pipeline = pipeline(ledger, Mode::Sign);

        let receipt = pipeline.submit(reveal_and_resolve(), true).await.unwrap();
        let group = receipt.group.expect("atomic submit must carry a group");

        let sent = pipeline.ledger.broadcasts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 2);
        assert!(sent[0].iter().all(|s| s.request.group == Some(group)));
    }

    #[tokio::test]
    async fn test_single_request_is_not_grouped() {
        let ledger = RecordingLedger {
            confirm: true,
            ..Default::default()
        };
        let pipeline = pipeline(ledger, Mode::Sign);

        let receipt = pipeline
            .submit(vec![request(Action::Join { match_id: MatchId(3) })], true)
            .await
            .unwrap();
        assert!(receipt.group.is_none());
    }

    #[test]
    fn test_group_id_is_order_sensitive() {
        let mut forward = reveal_and_resolve();
        let mut backward = reveal_and_resolve();
        backward.reverse();
        assert_ne!(assign_group(&mut forward), assign_group(&mut backward));

        // regrouping an already grouped set yields the same id
        let first = assign_group(&mut forward);
        assert_eq!(assign_group(&mut forward), first);
    }

    #[tokio::test]
    async fn test_signer_decline() {
        let pipeline = pipeline(RecordingLedger::default(), Mode::Decline);
        let err = pipeline.submit(reveal_and_resolve(), true).await.unwrap_err();
        assert!(matches!(err, FairPlayError::SigningRejected(_)));
        assert!(pipeline.ledger.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signature_count_mismatch() {
        let pipeline = pipeline(RecordingLedger::default(), Mode::DropOne);
        let err = pipeline.submit(reveal_and_resolve(), true).await.unwrap_err();
        assert!(matches!(err, FairPlayError::SigningRejected(_)));
        assert!(pipeline.ledger.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_rejected() {
        let ledger = RecordingLedger {
            reject: true,
            ..Default::default()
        };
        let pipeline = pipeline(ledger, Mode::Sign);
        let err = pipeline.submit(reveal_and_resolve(), true).await.unwrap_err();
        assert!(matches!(err, FairPlayError::BroadcastRejected(_)));
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let pipeline = pipeline(RecordingLedger::default(), Mode::Sign);
        let err = pipeline
            .submit(vec![request(Action::Create { wager: 10 })], false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FairPlayError::ConfirmationTimeout { rounds: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let pipeline = pipeline(RecordingLedger::default(), Mode::Sign);
        assert!(matches!(
            pipeline.submit(Vec::new(), false).await,
            Err(FairPlayError::InvalidRequest(_))
        ));
    }
}
