//! Drives a [`MatchSession`] against the ledger.

use crate::builder::RequestBuilder;
use crate::error::{MatchError, Result};
use crate::moves::Move;
use crate::record::{storage_key, MatchRecord, RemotePhase};
use crate::session::{MatchSession, MoveIntent, Phase, PollStep, Settlement};
use chrono::Utc;
use fairplay_core::{
    Address, ClientConfig, FairPlayError, LedgerReader, LedgerSubmitter, MatchId, Receipt, Signer,
    TransactionPipeline,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Reads after a confirmed submission are tried this many times.
const READ_BACK_ATTEMPTS: u32 = 3;

pub struct MatchClient<L: ?Sized, S: ?Sized> {
    ledger: Arc<L>,
    pipeline: TransactionPipeline<L, S>,
    app_id: u64,
    protocol_address: Address,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl<L, S> MatchClient<L, S>
where
    L: LedgerReader + LedgerSubmitter + ?Sized,
    S: Signer + ?Sized,
{
    pub fn new(config: &ClientConfig, ledger: Arc<L>, signer: Arc<S>) -> Self {
        Self {
            pipeline: TransactionPipeline::new(
                ledger.clone(),
                signer,
                config.max_confirmation_rounds,
            ),
            ledger,
            app_id: config.app_id,
            protocol_address: config.protocol_address(),
            poll_interval: config.poll_interval,
            settle_delay: config.settle_delay,
        }
    }

    /// The local participant.
    pub fn address(&self) -> Address {
        self.pipeline.signer().address()
    }

    pub fn protocol_address(&self) -> Address {
        self.protocol_address
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn builder(&self) -> fairplay_core::Result<RequestBuilder> {
        let params = self.ledger.suggested_params().await?;
        Ok(RequestBuilder::new(self.app_id, params))
    }

    /// Reads and decodes a match record. `None` if it does not exist.
    pub async fn fetch_record(
        &self,
        match_id: MatchId,
    ) -> fairplay_core::Result<Option<MatchRecord>> {
        match self.ledger.read_record(&storage_key(match_id)).await? {
            Some(bytes) => Ok(Some(MatchRecord::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `fetch_record` after a confirmed submission. Remote failures are
    /// retried every `poll_interval`.
    async fn read_back(&self, match_id: MatchId) -> fairplay_core::Result<Option<MatchRecord>> {
        let mut attempt = 1;
        loop {
            match self.fetch_record(match_id).await {
                Err(e) if e.is_remote() && attempt < READ_BACK_ATTEMPTS => {
                    tracing::debug!(
                        "Read-back of match {} failed (attempt {}): {}",
                        match_id,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn created_by_us(&self, match_id: MatchId, wager: u64) -> fairplay_core::Result<bool> {
        let me = self.address();
        Ok(self
            .read_back(match_id)
            .await?
            .map(|r| {
                r.player1 == me && r.wager == wager && r.remote_phase() == RemotePhase::Created
            })
            .unwrap_or(false))
    }

    /// Opens a new match and returns its confirmed id.
    ///
    /// The id is predicted from the counter before submission. After
    /// confirmation the predicted record is read back; if another creator
    /// took that id the ids up to the current counter are scanned for the
    /// match we actually created.
    ///
    /// If the create confirmed but the record cannot be read back, the
    /// session keeps the predicted id and `ReadBackFailed` is returned.
    pub async fn create(&self, session: &mut MatchSession, wager: u64) -> Result<MatchId> {
        session.begin_create()?;
        match self.submit_create(wager).await {
            Ok(match_id) => {
                session.complete_create(match_id, wager)?;
                Ok(match_id)
            }
            Err(MatchError::ReadBackFailed { match_id, source }) => {
                tracing::warn!("Match {} confirmed but not read back: {}", match_id, source);
                session.complete_create(match_id, wager)?;
                Err(MatchError::ReadBackFailed { match_id, source })
            }
            Err(e) => {
                tracing::warn!("Create failed: {}", e);
                session.revert();
                Err(e)
            }
        }
    }

    async fn submit_create(&self, wager: u64) -> Result<MatchId> {
        let counter = self.ledger.read_counter().await?;
        let predicted = counter
            .checked_add(1)
            .map(MatchId)
            .ok_or_else(|| FairPlayError::internal("match counter overflow"))?;

        let built = self.builder().await?.build_create(self.address(), wager, predicted);
        self.pipeline.submit(built.requests, false).await?;

        // the match exists from here on
        match self.confirm_created(predicted, wager).await {
            Err(MatchError::Core(source)) => Err(MatchError::ReadBackFailed {
                match_id: predicted,
                source,
            }),
            other => other,
        }
    }

    async fn confirm_created(&self, predicted: MatchId, wager: u64) -> Result<MatchId> {
        if self.created_by_us(predicted, wager).await? {
            return Ok(predicted);
        }

        let counter = self.ledger.read_counter().await?;
        tracing::warn!(
            "Predicted match {} was taken, scanning up to {}",
            predicted,
            counter
        );
        let mut candidate = predicted.next();
        while let Some(id) = candidate.filter(|id| id.0 <= counter) {
            if self.created_by_us(id, wager).await? {
                tracing::info!("Adopted match {} instead of {}", id, predicted);
                return Ok(id);
            }
            candidate = id.next();
        }

        Err(MatchError::PredictionRace { predicted, counter })
    }

    pub async fn join(&self, session: &mut MatchSession, match_id: MatchId) -> Result<u64> {
        session.begin_join(match_id)?;
        match self.submit_join(match_id).await {
            Ok(wager) => {
                session.complete_join(wager)?;
                Ok(wager)
            }
            Err(MatchError::ReadBackFailed { match_id, source }) => {
                tracing::warn!(
                    "Join of match {} confirmed but not read back: {}",
                    match_id,
                    source
                );
                session.complete_join_unverified()?;
                Err(MatchError::ReadBackFailed { match_id, source })
            }
            Err(e) => {
                tracing::warn!("Join of match {} failed: {}", match_id, e);
                session.revert();
                Err(e)
            }
        }
    }

    /// Join from user input. Bad ids are rejected before anything is sent.
    pub async fn join_str(&self, session: &mut MatchSession, match_id: &str) -> Result<u64> {
        let match_id: MatchId = match_id.parse()?;
        self.join(session, match_id).await
    }

    async fn submit_join(&self, match_id: MatchId) -> Result<u64> {
        let me = self.address();
        let built = self.builder().await?.build_join(me, match_id);
        self.pipeline.submit(built.requests, false).await?;

        let record = match self.read_back(match_id).await {
            Ok(record) => record,
            Err(source) => return Err(MatchError::ReadBackFailed { match_id, source }),
        };
        let record = record.ok_or_else(|| {
            FairPlayError::ledger(format!("match {} vanished after join", match_id))
        })?;
        if record.player2 != me {
            return Err(FairPlayError::ledger(format!(
                "match {} was joined by {}",
                match_id, record.player2
            ))
            .into());
        }
        Ok(record.wager)
    }

    /// One opponent poll. A missing record is benign; other read errors end
    /// the poll but leave the session waiting.
    pub async fn poll_once(&self, session: &mut MatchSession) -> Result<PollStep> {
        let token = session.poll_token().ok_or(MatchError::PollCancelled)?;
        if !session.is_poll_current(&token) {
            return Ok(PollStep::Stale);
        }
        let match_id = session.match_id().ok_or(MatchError::NoActiveMatch)?;

        match self.fetch_record(match_id).await? {
            Some(record) => Ok(session.observe_record(&token, &record)),
            None => {
                tracing::debug!("Match {} not visible yet", match_id);
                Ok(PollStep::NotFound)
            }
        }
    }

    /// Polls every `poll_interval` until an opponent is seated.
    pub async fn wait_for_opponent(&self, session: &mut MatchSession) -> Result<Address> {
        if session.phase() != Phase::WaitingForOpponent {
            return Err(MatchError::InvalidPhase {
                expected: "WaitingForOpponent",
                actual: session.phase(),
            });
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.poll_once(session).await? {
                PollStep::OpponentJoined(opponent) => return Ok(opponent),
                PollStep::Stale => return Err(MatchError::PollCancelled),
                PollStep::NotFound | PollStep::Pending => {}
            }
        }
    }

    /// Polls until both commitment slots are filled, so a reveal cannot
    /// race the opponent's commit.
    pub async fn wait_for_commitments(&self, session: &MatchSession) -> Result<MatchRecord> {
        if session.phase() != Phase::Committed {
            return Err(MatchError::InvalidPhase {
                expected: "Committed",
                actual: session.phase(),
            });
        }
        let match_id = session.match_id().ok_or(MatchError::NoActiveMatch)?;

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Some(record) = self.fetch_record(match_id).await? {
                if !record.commitment1.is_zero() && !record.commitment2.is_zero() {
                    return Ok(record);
                }
                tracing::debug!("Match {}: opponent has not committed yet", match_id);
            }
        }
    }

    /// Commits `chosen` with a fresh secret.
    pub async fn commit(&self, session: &mut MatchSession, chosen: Move) -> Result<Receipt> {
        let intent = session.begin_commit(chosen)?;
        match self.submit_commit(&intent).await {
            Ok(receipt) => {
                session.complete_commit(Utc::now())?;
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!("Commit to match {} failed: {}", intent.match_id, e);
                session.revert();
                Err(e.into())
            }
        }
    }

    async fn submit_commit(&self, intent: &MoveIntent) -> fairplay_core::Result<Receipt> {
        let built = self.builder().await?.build_commit(
            self.address(),
            intent.match_id,
            intent.chosen.label(),
            intent.secret.expose(),
        );
        self.pipeline.submit(built.requests, false).await
    }

    /// Reveals and resolves in one atomic group, then settles from the
    /// re-read record. A record that is not `Resolved` yet is an error and
    /// leaves the session `Committed`.
    pub async fn reveal(&self, session: &mut MatchSession) -> Result<Settlement> {
        let intent = session.begin_reveal()?;
        match self.submit_reveal(&intent).await {
            Ok(record) => session.complete_reveal(
                &record,
                &self.address(),
                &self.protocol_address,
                Instant::now(),
                Utc::now(),
            ),
            Err(e) => {
                tracing::warn!("Reveal of match {} failed: {}", intent.match_id, e);
                session.revert();
                Err(e.into())
            }
        }
    }

    async fn submit_reveal(&self, intent: &MoveIntent) -> fairplay_core::Result<MatchRecord> {
        let built = self.builder().await?.build_reveal_and_resolve(
            self.address(),
            intent.match_id,
            intent.chosen.label(),
            intent.secret.expose(),
        );
        self.pipeline.submit(built.requests, true).await?;

        let record = self.read_back(intent.match_id).await?.ok_or_else(|| {
            FairPlayError::ledger(format!("match {} missing after reveal", intent.match_id))
        })?;
        if record.remote_phase() != RemotePhase::Resolved {
            return Err(FairPlayError::ledger(format!(
                "match {} not resolved yet ({:?})",
                intent.match_id,
                record.remote_phase()
            )));
        }
        Ok(record)
    }

    /// Settles a committed session whose match already resolved on the ledger,
    /// e.g. after a reveal whose read-back failed. Returns `None` if the
    /// match is not resolved yet.
    pub async fn reconcile(&self, session: &mut MatchSession) -> Result<Option<Settlement>> {
        let match_id = session.match_id().ok_or(MatchError::NoActiveMatch)?;
        let record = match self.fetch_record(match_id).await? {
            Some(record) if record.remote_phase() == RemotePhase::Resolved => record,
            _ => return Ok(None),
        };

        session.begin_reveal()?;
        let me = self.address();
        session
            .complete_reveal(
                &record,
                &me,
                &self.protocol_address,
                Instant::now(),
                Utc::now(),
            )
            .map(Some)
    }

    /// Waits out the settle delay and returns the session to Idle.
    pub async fn recycle_after_settlement(&self, session: &mut MatchSession) -> bool {
        if session.phase() != Phase::Settled {
            return false;
        }
        tokio::time::sleep(self.settle_delay).await;
        session.tick(Instant::now(), self.settle_delay)
    }
}

/// Background opponent poll over a shared session.
///
/// The task is aborted when the watch is dropped.
pub struct OpponentWatch {
    handle: Option<JoinHandle<Result<Address>>>,
}

impl OpponentWatch {
    pub fn spawn<L, S>(client: Arc<MatchClient<L, S>>, session: Arc<Mutex<MatchSession>>) -> Self
    where
        L: LedgerReader + LedgerSubmitter + ?Sized + 'static,
        S: Signer + ?Sized + 'static,
    {
        let handle = tokio::spawn(watch_for_opponent(client, session));
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub async fn join(mut self) -> Result<Address> {
        match self.handle.take() {
            Some(handle) => handle.await.map_err(|_| MatchError::PollCancelled)?,
            None => Err(MatchError::PollCancelled),
        }
    }

    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn watch_for_opponent<L, S>(
    client: Arc<MatchClient<L, S>>,
    session: Arc<Mutex<MatchSession>>,
) -> Result<Address>
where
    L: LedgerReader + LedgerSubmitter + ?Sized,
    S: Signer + ?Sized,
{
    let (token, match_id) = {
        let session = session.lock().await;
        let token = session.poll_token().ok_or(MatchError::PollCancelled)?;
        let match_id = session.match_id().ok_or(MatchError::NoActiveMatch)?;
        (token, match_id)
    };

    let mut interval = tokio::time::interval(client.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !session.lock().await.is_poll_current(&token) {
            return Err(MatchError::PollCancelled);
        }

        // the session lock is not held across the read
        let record = match client.fetch_record(match_id).await? {
            Some(record) => record,
            None => continue,
        };

        match session.lock().await.observe_record(&token, &record) {
            PollStep::OpponentJoined(opponent) => return Ok(opponent),
            PollStep::Stale => return Err(MatchError::PollCancelled),
            PollStep::NotFound | PollStep::Pending => {}
        }
    }
}

impl Drop for OpponentWatch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
