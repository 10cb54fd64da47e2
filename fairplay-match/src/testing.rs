//! In-memory ledger and signer doubles.

use crate::moves::Move;
use crate::record::{storage_key, MatchRecord};
use async_trait::async_trait;
use fairplay_core::{
    Action, ActionRequest, Address, ConfirmationHandle, FairPlayError, LedgerReader,
    LedgerSubmitter, MatchId, Receipt, Result, SignedRequest, Signer, StorageKey, TxParams,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const ME: Address = Address::new([1; 32]);
pub const THEM: Address = Address::new([2; 32]);

#[derive(Default)]
struct State {
    counter: u64,
    round: u64,
    records: HashMap<MatchId, MatchRecord>,
    foreign_creates: VecDeque<(Address, u64)>,
    drop_own_creates: bool,
    reject_broadcasts: bool,
    fail_reads: bool,
    fail_reads_after_broadcast: Option<u32>,
    failing_reads: u32,
    seat_after: Option<(MatchId, Address, u32)>,
    resolve_on_reveal: Option<(MatchId, Move, Address)>,
    submitted: Vec<Vec<SignedRequest>>,
    reads: usize,
}

/// Applies submitted actions to an in-memory record map the way the
/// ledger application would.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<State>,
}

impl MockLedger {
    pub fn with_counter(counter: u64) -> Self {
        let ledger = Self::default();
        ledger.state.lock().counter = counter;
        ledger
    }

    pub fn put(&self, match_id: MatchId, record: MatchRecord) {
        self.state.lock().records.insert(match_id, record);
    }

    pub fn remove(&self, match_id: MatchId) {
        self.state.lock().records.remove(&match_id);
    }

    pub fn record(&self, match_id: MatchId) -> Option<MatchRecord> {
        self.state.lock().records.get(&match_id).cloned()
    }

    /// Another creator's match lands just before the next local create.
    pub fn queue_foreign_create(&self, creator: Address, wager: u64) {
        self.state.lock().foreign_creates.push_back((creator, wager));
    }

    /// Creates confirm but never produce a record.
    pub fn drop_own_creates(&self) {
        self.state.lock().drop_own_creates = true;
    }

    pub fn reject_broadcasts(&self) {
        self.state.lock().reject_broadcasts = true;
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    /// The next `count` record reads after the next broadcast fail.
    pub fn fail_reads_after_broadcast(&self, count: u32) {
        self.state.lock().fail_reads_after_broadcast = Some(count);
    }

    /// `opponent` takes the second seat on the `reads`-th read of the record.
    pub fn seat_after_reads(&self, match_id: MatchId, opponent: Address, reads: u32) {
        self.state.lock().seat_after = Some((match_id, opponent, reads));
    }

    /// On reveal the opponent's move is filled in and `winner` is written.
    pub fn resolve_on_reveal(&self, match_id: MatchId, opponent_move: Move, winner: Address) {
        self.state.lock().resolve_on_reveal = Some((match_id, opponent_move, winner));
    }

    pub fn submitted(&self) -> Vec<Vec<SignedRequest>> {
        self.state.lock().submitted.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

impl State {
    fn apply(&mut self, request: &ActionRequest) -> Result<()> {
        let sender = request.sender;
        match &request.action {
            Action::Create { wager } => {
                while let Some((creator, w)) = self.foreign_creates.pop_front() {
                    self.counter += 1;
                    self.records
                        .insert(MatchId(self.counter), MatchRecord::created(creator, w));
                }
                self.counter += 1;
                if !self.drop_own_creates {
                    self.records
                        .insert(MatchId(self.counter), MatchRecord::created(sender, *wager));
                }
            }
            Action::Join { match_id } => {
                let record = self.open(*match_id)?;
                if record.has_opponent() {
                    return Err(FairPlayError::broadcast_rejected("match is full"));
                }
                record.player2 = sender;
            }
            Action::Commit {
                match_id,
                commitment,
            } => {
                let record = self.open(*match_id)?;
                if record.player1 == sender {
                    record.commitment1 = *commitment;
                } else {
                    record.commitment2 = *commitment;
                }
                record.state = 2;
            }
            Action::Reveal {
                match_id,
                move_label,
                ..
            } => {
                let ordinal = move_label
                    .parse::<Move>()
                    .map(Move::ordinal)
                    .map_err(|e| FairPlayError::broadcast_rejected(e.to_string()))?;
                let resolution = self.resolve_on_reveal;
                let record = self.open(*match_id)?;
                let local_is_first = record.player1 == sender;
                if local_is_first {
                    record.move1 = ordinal;
                } else {
                    record.move2 = ordinal;
                }
                record.state = 3;

                if let Some((id, opponent_move, winner)) = resolution {
                    if id == *match_id {
                        if local_is_first {
                            record.move2 = opponent_move.ordinal();
                        } else {
                            record.move1 = opponent_move.ordinal();
                        }
                        record.winner = winner;
                        record.state = 4;
                    }
                }
            }
            Action::Resolve { match_id } => {
                self.open(*match_id)?;
            }
        }
        Ok(())
    }

    fn open(&mut self, match_id: MatchId) -> Result<&mut MatchRecord> {
        self.records
            .get_mut(&match_id)
            .ok_or_else(|| FairPlayError::broadcast_rejected(format!("no match {}", match_id)))
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn read_counter(&self) -> Result<u64> {
        Ok(self.state.lock().counter)
    }

    async fn read_record(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.fail_reads {
            return Err(FairPlayError::ledger("node unavailable"));
        }
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(FairPlayError::ledger("node unavailable"));
        }

        let Some(match_id) = state
            .records
            .keys()
            .copied()
            .find(|id| storage_key(*id) == *key)
        else {
            return Ok(None);
        };

        if let Some((id, opponent, remaining)) = state.seat_after {
            if id == match_id {
                if remaining <= 1 {
                    state.seat_after = None;
                    if let Some(record) = state.records.get_mut(&match_id) {
                        record.player2 = opponent;
                    }
                } else {
                    state.seat_after = Some((id, opponent, remaining - 1));
                }
            }
        }

        Ok(state
            .records
            .get(&match_id)
            .map(|record| record.encode().to_vec()))
    }

    async fn suggested_params(&self) -> Result<TxParams> {
        Ok(TxParams::from_last_round(1000, self.state.lock().round, "mocknet"))
    }
}

#[async_trait]
impl LedgerSubmitter for MockLedger {
    async fn broadcast(&self, signed: &[SignedRequest]) -> Result<ConfirmationHandle> {
        let mut state = self.state.lock();
        if state.reject_broadcasts {
            return Err(FairPlayError::broadcast_rejected("logic eval error"));
        }

        // all-or-nothing: apply to a scratch copy first
        let mut scratch = State {
            counter: state.counter,
            records: state.records.clone(),
            foreign_creates: state.foreign_creates.clone(),
            drop_own_creates: state.drop_own_creates,
            resolve_on_reveal: state.resolve_on_reveal,
            ..State::default()
        };
        for s in signed {
            scratch.apply(&s.request)?;
        }
        state.counter = scratch.counter;
        state.records = scratch.records;
        state.foreign_creates = scratch.foreign_creates;
        state.submitted.push(signed.to_vec());
        state.round += 1;
        if let Some(count) = state.fail_reads_after_broadcast.take() {
            state.failing_reads = count;
        }

        Ok(ConfirmationHandle {
            txid: signed[0].request.txid(),
            submitted_round: Some(state.round),
        })
    }

    async fn await_confirmation(
        &self,
        handle: &ConfirmationHandle,
        _max_rounds: u64,
    ) -> Result<Receipt> {
        Ok(Receipt {
            txid: handle.txid.clone(),
            confirmed_round: handle.submitted_round.unwrap_or_default() + 1,
            group: None,
        })
    }
}

pub struct MockSigner {
    address: Address,
    decline: Arc<AtomicBool>,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            decline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn declining(address: Address) -> Self {
        let signer = Self::new(address);
        signer.decline.store(true, Ordering::SeqCst);
        signer
    }

    pub fn decline_handle(&self) -> Arc<AtomicBool> {
        self.decline.clone()
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, requests: &[ActionRequest]) -> Result<Vec<SignedRequest>> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(FairPlayError::signing_rejected("user declined"));
        }
        Ok(requests
            .iter()
            .map(|request| SignedRequest {
                request: request.clone(),
                signer: self.address,
                signature: vec![0; 64],
            })
            .collect())
    }
}
