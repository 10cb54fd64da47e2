//! Client-side match lifecycle.
//!
//! [`MatchSession`] owns everything local about one match and exposes the
//! lifecycle as plain synchronous transitions. Nothing here touches the
//! network or reads the clock; [`crate::client::MatchClient`] drives these
//! transitions around ledger round-trips.
//!
//! ```text
//! Idle -> Creating -> WaitingForOpponent -> Ready
//! Idle -> Joining ---------------------------^
//! Ready -> Committing -> Committed -> Revealing -> Settled -> Idle
//! ```

use crate::commitment::{self, Secret};
use crate::error::{MatchError, Result};
use crate::moves::Move;
use crate::outcome::{classify, Outcome};
use crate::record::MatchRecord;
use chrono::{DateTime, Utc};
use fairplay_core::{Address, Commitment, MatchId, RoundRecord};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Creating,
    Joining,
    WaitingForOpponent,
    /// Both seats taken, no move committed yet.
    Ready,
    Committing,
    Committed,
    Revealing,
    Settled,
}

impl Phase {
    /// A request has been submitted and is awaiting confirmation.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Phase::Creating | Phase::Joining | Phase::Committing | Phase::Revealing
        )
    }
}

/// Handle for one opponent-polling run. Invalidated on any exit from
/// `WaitingForOpponent`; ticks carrying a stale token change nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollToken {
    session: Uuid,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// The token no longer belongs to an active poll.
    Stale,
    /// Record not created yet.
    NotFound,
    /// Record exists, second seat still empty.
    Pending,
    /// Opponent seated; polling is over.
    OpponentJoined(Address),
}

/// One round in the session transcript. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub match_id: MatchId,
    pub wager: u64,
    pub my_move: Move,
    pub opponent_move: Option<Move>,
    pub outcome: Option<Outcome>,
    pub net: Option<i64>,
    pub committed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn is_provisional(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn to_round_record(&self, player: Address) -> Option<RoundRecord> {
        let outcome = self.outcome?;
        Some(RoundRecord {
            match_id: self.match_id,
            player,
            wager: self.wager,
            my_move: self.my_move.label().to_string(),
            opponent_move: self.opponent_move.map(|m| m.label().to_string()),
            outcome: outcome.as_str().to_string(),
            net: self.net.unwrap_or_default(),
            settled_at: self.settled_at.unwrap_or(self.committed_at),
        })
    }
}

/// Result of a settled round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub match_id: MatchId,
    pub wager: u64,
    pub outcome: Outcome,
    pub multiplier: u64,
    pub net: i64,
    pub opponent_move: Option<Move>,
    pub record: MatchRecord,
}

/// What a commit or reveal needs to build its request.
#[derive(Debug, Clone)]
pub struct MoveIntent {
    pub match_id: MatchId,
    pub chosen: Move,
    pub secret: Secret,
}

#[derive(Debug)]
pub struct MatchSession {
    id: Uuid,
    phase: Phase,
    match_id: Option<MatchId>,
    wager: Option<u64>,
    chosen_move: Option<Move>,
    secret: Option<Secret>,
    commitment: Option<Commitment>,
    poll_generation: u64,
    active_poll: Option<u64>,
    settled_at: Option<Instant>,
    history: Vec<HistoryEntry>,
}

impl Default for MatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Idle,
            match_id: None,
            wager: None,
            chosen_move: None,
            secret: None,
            commitment: None,
            poll_generation: 0,
            active_poll: None,
            settled_at: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn match_id(&self) -> Option<MatchId> {
        self.match_id
    }

    pub fn wager(&self) -> Option<u64> {
        self.wager
    }

    pub fn chosen_move(&self) -> Option<Move> {
        self.chosen_move
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    fn guard(&self, expected: &'static str, allowed: Phase) -> Result<()> {
        if self.phase.is_in_flight() {
            return Err(MatchError::ActionInFlight(self.phase));
        }
        if self.phase != allowed {
            return Err(MatchError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn require(&self, expected: &'static str, phase: Phase) -> Result<()> {
        if self.phase != phase {
            return Err(MatchError::InvalidPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn active_match(&self) -> Result<MatchId> {
        self.match_id.ok_or(MatchError::NoActiveMatch)
    }

    fn transition(&mut self, to: Phase) {
        tracing::debug!("Session {}: {:?} -> {:?}", self.id, self.phase, to);
        self.phase = to;
    }

    fn clear_move(&mut self) {
        self.chosen_move = None;
        self.secret = None;
        self.commitment = None;
    }

    fn clear_match(&mut self) {
        self.clear_move();
        self.active_poll = None;
        self.match_id = None;
        self.wager = None;
        self.settled_at = None;
    }

    pub fn begin_create(&mut self) -> Result<()> {
        self.guard("Idle", Phase::Idle)?;
        self.transition(Phase::Creating);
        Ok(())
    }

    /// Stores the confirmed id and starts a new poll.
    pub fn complete_create(&mut self, match_id: MatchId, wager: u64) -> Result<PollToken> {
        self.require("Creating", Phase::Creating)?;
        self.match_id = Some(match_id);
        self.wager = Some(wager);
        self.transition(Phase::WaitingForOpponent);

        self.poll_generation += 1;
        self.active_poll = Some(self.poll_generation);
        tracing::info!(
            "Session {}: created match {} with wager {}",
            self.id,
            match_id,
            wager
        );
        Ok(PollToken {
            session: self.id,
            generation: self.poll_generation,
        })
    }

    pub fn begin_join(&mut self, match_id: MatchId) -> Result<()> {
        self.guard("Idle", Phase::Idle)?;
        self.match_id = Some(match_id);
        self.transition(Phase::Joining);
        Ok(())
    }

    pub fn complete_join(&mut self, wager: u64) -> Result<()> {
        self.require("Joining", Phase::Joining)?;
        self.wager = Some(wager);
        self.transition(Phase::Ready);
        tracing::info!(
            "Session {}: joined match {} with wager {}",
            self.id,
            self.active_match()?,
            wager
        );
        Ok(())
    }

    /// Enters a confirmed join whose record could not be read. The wager is
    /// filled in from the record at settlement.
    pub fn complete_join_unverified(&mut self) -> Result<()> {
        self.require("Joining", Phase::Joining)?;
        self.wager = None;
        self.transition(Phase::Ready);
        tracing::warn!(
            "Session {}: joined match {} without reading it back",
            self.id,
            self.active_match()?
        );
        Ok(())
    }

    pub fn poll_token(&self) -> Option<PollToken> {
        self.active_poll.map(|generation| PollToken {
            session: self.id,
            generation,
        })
    }

    pub fn is_poll_current(&self, token: &PollToken) -> bool {
        token.session == self.id
            && self.phase == Phase::WaitingForOpponent
            && self.active_poll == Some(token.generation)
    }

    pub fn cancel_poll(&mut self) {
        if self.active_poll.take().is_some() {
            tracing::debug!("Session {}: opponent poll cancelled", self.id);
        }
    }

    /// Applies one poll result. The poll ends the first time the second seat
    /// is seen filled; every later call with the same token is `Stale`.
    pub fn observe_record(&mut self, token: &PollToken, record: &MatchRecord) -> PollStep {
        if !self.is_poll_current(token) {
            return PollStep::Stale;
        }
        if !record.has_opponent() {
            return PollStep::Pending;
        }

        self.active_poll = None;
        self.transition(Phase::Ready);
        tracing::info!(
            "Session {}: opponent {} joined match {:?}",
            self.id,
            record.player2,
            self.match_id
        );
        PollStep::OpponentJoined(record.player2)
    }

    /// Generates a fresh secret for `chosen` and marks the commit in flight.
    pub fn begin_commit(&mut self, chosen: Move) -> Result<MoveIntent> {
        self.guard("Ready", Phase::Ready)?;
        let match_id = self.active_match()?;

        let secret = Secret::generate();
        self.commitment = Some(commitment::commit(chosen.label(), secret.expose()));
        self.chosen_move = Some(chosen);
        self.secret = Some(secret.clone());
        self.transition(Phase::Committing);

        Ok(MoveIntent {
            match_id,
            chosen,
            secret,
        })
    }

    /// Records the provisional round and keeps move and secret for the reveal.
    pub fn complete_commit(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require("Committing", Phase::Committing)?;
        let match_id = self.active_match()?;
        let my_move = self.chosen_move.ok_or(MatchError::CommitmentMismatch)?;

        self.history.push(HistoryEntry {
            match_id,
            wager: self.wager.unwrap_or_default(),
            my_move,
            opponent_move: None,
            outcome: None,
            net: None,
            committed_at: now,
            settled_at: None,
        });
        self.transition(Phase::Committed);
        Ok(())
    }

    /// Hands out the committed move and secret for the reveal.
    pub fn begin_reveal(&mut self) -> Result<MoveIntent> {
        self.guard("Committed", Phase::Committed)?;
        let match_id = self.active_match()?;
        let (chosen, secret, commitment) =
            match (self.chosen_move, self.secret.as_ref(), self.commitment.as_ref()) {
                (Some(m), Some(s), Some(c)) => (m, s, c),
                _ => return Err(MatchError::CommitmentMismatch),
            };

        if !commitment::verify(commitment, chosen.label(), secret.expose()) {
            return Err(MatchError::CommitmentMismatch);
        }

        let intent = MoveIntent {
            match_id,
            chosen,
            secret: secret.clone(),
        };
        self.transition(Phase::Revealing);
        Ok(intent)
    }

    /// Settles the round from the resolved record and discards move and secret.
    pub fn complete_reveal(
        &mut self,
        record: &MatchRecord,
        local: &Address,
        protocol: &Address,
        now: Instant,
        wall_clock: DateTime<Utc>,
    ) -> Result<Settlement> {
        self.require("Revealing", Phase::Revealing)?;
        let match_id = self.active_match()?;
        let wager = self.wager.unwrap_or(record.wager);

        let outcome = classify(record, local, protocol);
        let net = outcome.net(wager);
        let opponent_move = record.opponent_move(local);

        if let Some(entry) = self
            .history
            .iter_mut()
            .rev()
            .find(|e| e.match_id == match_id && e.is_provisional())
        {
            entry.wager = wager;
            entry.opponent_move = opponent_move;
            entry.outcome = Some(outcome);
            entry.net = Some(net);
            entry.settled_at = Some(wall_clock);
        }

        self.clear_move();
        self.settled_at = Some(now);
        self.transition(Phase::Settled);
        tracing::info!(
            "Session {}: match {} settled as {} ({:+})",
            self.id,
            match_id,
            outcome,
            net
        );

        Ok(Settlement {
            match_id,
            wager,
            outcome,
            multiplier: outcome.multiplier(),
            net,
            opponent_move,
            record: record.clone(),
        })
    }

    /// Rolls an in-flight phase back after a failed submission.
    ///
    /// Creating and Joining fall back to Idle with no match, Committing to
    /// Ready with the secret dropped, Revealing to Committed with move and
    /// secret kept for a retry.
    pub fn revert(&mut self) -> Phase {
        match self.phase {
            Phase::Creating | Phase::Joining => {
                self.clear_match();
                self.transition(Phase::Idle);
            }
            Phase::Committing => {
                self.clear_move();
                self.transition(Phase::Ready);
            }
            Phase::Revealing => self.transition(Phase::Committed),
            _ => {}
        }
        self.phase
    }

    /// Moves a settled session back to Idle once `settle_delay` has passed.
    pub fn tick(&mut self, now: Instant, settle_delay: Duration) -> bool {
        match (self.phase, self.settled_at) {
            (Phase::Settled, Some(at)) if now.saturating_duration_since(at) >= settle_delay => {
                self.recycle();
                true
            }
            _ => false,
        }
    }

    fn recycle(&mut self) {
        self.clear_match();
        self.transition(Phase::Idle);
    }

    /// Drops the current match from any phase. History is kept.
    pub fn abandon(&mut self) {
        if self.phase.is_in_flight() {
            tracing::warn!(
                "Session {}: abandoning match {:?} with an action in flight",
                self.id,
                self.match_id
            );
        }
        self.clear_match();
        self.transition(Phase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: Address = Address::new([1; 32]);
    const THEM: Address = Address::new([2; 32]);

    fn protocol() -> Address {
        Address::for_application(9)
    }

    fn ready_session() -> MatchSession {
        let mut session = MatchSession::new();
        session.begin_join(MatchId(4)).unwrap();
        session.complete_join(10).unwrap();
        session
    }

    fn committed_session(chosen: Move) -> MatchSession {
        let mut session = ready_session();
        session.begin_commit(chosen).unwrap();
        session.complete_commit(Utc::now()).unwrap();
        session
    }

    fn resolved(winner: Address) -> MatchRecord {
        let mut record = MatchRecord::created(THEM, 10);
        record.player2 = ME;
        record.state = 4;
        record.move1 = Move::Scissors.ordinal();
        record.move2 = Move::Rock.ordinal();
        record.winner = winner;
        record
    }

    #[test]
    fn test_create_failure_returns_to_idle() {
        let mut session = MatchSession::new();
        session.begin_create().unwrap();
        assert_eq!(session.phase(), Phase::Creating);

        assert_eq!(session.revert(), Phase::Idle);
        assert_eq!(session.match_id(), None);
        assert!(session.poll_token().is_none());
    }

    #[test]
    fn test_in_flight_rejects_new_actions() {
        let mut session = MatchSession::new();
        session.begin_create().unwrap();

        assert!(matches!(
            session.begin_create(),
            Err(MatchError::ActionInFlight(Phase::Creating))
        ));
        assert!(matches!(
            session.begin_join(MatchId(1)),
            Err(MatchError::ActionInFlight(_))
        ));
        assert!(matches!(
            session.begin_commit(Move::Rock),
            Err(MatchError::ActionInFlight(_))
        ));
    }

    #[test]
    fn test_wrong_phase_is_rejected() {
        let mut session = MatchSession::new();
        assert!(matches!(
            session.begin_commit(Move::Rock),
            Err(MatchError::InvalidPhase { expected: "Ready", .. })
        ));
        assert!(matches!(
            session.begin_reveal(),
            Err(MatchError::InvalidPhase { .. })
        ));
        assert!(session.complete_join(5).is_err());
    }

    #[test]
    fn test_poll_cancels_exactly_once() {
        let mut session = MatchSession::new();
        session.begin_create().unwrap();
        let token = session.complete_create(MatchId(3), 10).unwrap();

        let mut record = MatchRecord::created(ME, 10);
        assert_eq!(session.observe_record(&token, &record), PollStep::Pending);
        assert!(session.is_poll_current(&token));
        assert_eq!(session.phase(), Phase::WaitingForOpponent);

        record.player2 = THEM;
        assert_eq!(
            session.observe_record(&token, &record),
            PollStep::OpponentJoined(THEM)
        );
        assert_eq!(session.phase(), Phase::Ready);
        assert!(!session.is_poll_current(&token));

        // a late tick after the exit changes nothing
        assert_eq!(session.observe_record(&token, &record), PollStep::Stale);
        assert_eq!(session.phase(), Phase::Ready);
    }

    #[test]
    fn test_abandon_invalidates_poll() {
        let mut session = MatchSession::new();
        session.begin_create().unwrap();
        let token = session.complete_create(MatchId(3), 10).unwrap();

        session.abandon();
        let mut record = MatchRecord::created(ME, 10);
        record.player2 = THEM;
        assert_eq!(session.observe_record(&token, &record), PollStep::Stale);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.match_id(), None);
    }

    #[test]
    fn test_tokens_from_other_sessions_are_stale() {
        let mut a = MatchSession::new();
        a.begin_create().unwrap();
        let token = a.complete_create(MatchId(1), 1).unwrap();

        let mut b = MatchSession::new();
        b.begin_create().unwrap();
        b.complete_create(MatchId(1), 1).unwrap();

        let mut record = MatchRecord::created(ME, 1);
        record.player2 = THEM;
        assert_eq!(b.observe_record(&token, &record), PollStep::Stale);
    }

    #[test]
    fn test_commit_failure_discards_secret() {
        let mut session = ready_session();
        session.begin_commit(Move::Paper).unwrap();
        assert!(session.has_secret());

        assert_eq!(session.revert(), Phase::Ready);
        assert!(!session.has_secret());
        assert_eq!(session.chosen_move(), None);
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_fresh_secret_per_commit() {
        let mut session = ready_session();
        let first = session.begin_commit(Move::Rock).unwrap();
        session.revert();
        let second = session.begin_commit(Move::Rock).unwrap();
        assert_ne!(first.secret, second.secret);
    }

    #[test]
    fn test_reveal_failure_keeps_secret() {
        let mut session = committed_session(Move::Rock);
        let intent = session.begin_reveal().unwrap();
        assert_eq!(intent.chosen, Move::Rock);

        assert_eq!(session.revert(), Phase::Committed);
        assert!(session.has_secret());
        assert!(session.history()[0].is_provisional());

        let retry = session.begin_reveal().unwrap();
        assert_eq!(retry.secret, intent.secret);
    }

    #[test]
    fn test_settle_win_then_recycle() {
        let mut session = committed_session(Move::Rock);
        session.begin_reveal().unwrap();

        let settled_at = Instant::now();
        let settlement = session
            .complete_reveal(&resolved(ME), &ME, &protocol(), settled_at, Utc::now())
            .unwrap();

        assert_eq!(settlement.outcome, Outcome::Win);
        assert_eq!(settlement.net, 10);
        assert_eq!(settlement.multiplier, 2);
        assert_eq!(settlement.opponent_move, Some(Move::Scissors));
        assert_eq!(session.phase(), Phase::Settled);
        assert!(!session.has_secret());

        let entry = &session.history()[0];
        assert_eq!(entry.outcome, Some(Outcome::Win));
        assert_eq!(entry.net, Some(10));
        assert_eq!(entry.opponent_move, Some(Move::Scissors));

        let delay = Duration::from_secs(3);
        assert!(!session.tick(settled_at + Duration::from_secs(1), delay));
        assert_eq!(session.phase(), Phase::Settled);
        assert!(session.tick(settled_at + delay, delay));
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.match_id(), None);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_settle_draw_and_loss() {
        let mut draw = committed_session(Move::Rock);
        draw.begin_reveal().unwrap();
        let settlement = draw
            .complete_reveal(&resolved(protocol()), &ME, &protocol(), Instant::now(), Utc::now())
            .unwrap();
        assert_eq!(settlement.outcome, Outcome::Draw);
        assert_eq!(settlement.net, 0);

        let mut loss = committed_session(Move::Rock);
        loss.begin_reveal().unwrap();
        let settlement = loss
            .complete_reveal(&resolved(THEM), &ME, &protocol(), Instant::now(), Utc::now())
            .unwrap();
        assert_eq!(settlement.outcome, Outcome::Lose);
        assert_eq!(settlement.net, -10);
    }

    #[test]
    fn test_unverified_join_takes_wager_from_record() {
        let mut session = MatchSession::new();
        session.begin_join(MatchId(4)).unwrap();
        session.complete_join_unverified().unwrap();
        assert_eq!(session.phase(), Phase::Ready);
        assert_eq!(session.match_id(), Some(MatchId(4)));
        assert_eq!(session.wager(), None);

        session.begin_commit(Move::Rock).unwrap();
        session.complete_commit(Utc::now()).unwrap();
        assert_eq!(session.history()[0].wager, 0);

        session.begin_reveal().unwrap();
        let settlement = session
            .complete_reveal(&resolved(ME), &ME, &protocol(), Instant::now(), Utc::now())
            .unwrap();
        assert_eq!(settlement.wager, 10);
        assert_eq!(settlement.net, 10);
        assert_eq!(session.history()[0].wager, 10);
    }

    #[test]
    fn test_history_to_round_record() {
        let mut session = committed_session(Move::Paper);
        assert!(session.history()[0].to_round_record(ME).is_none());

        session.begin_reveal().unwrap();
        session
            .complete_reveal(&resolved(ME), &ME, &protocol(), Instant::now(), Utc::now())
            .unwrap();

        let round = session.history()[0].to_round_record(ME).unwrap();
        assert_eq!(round.my_move, "Paper");
        assert_eq!(round.opponent_move.as_deref(), Some("Scissors"));
        assert_eq!(round.outcome, "win");
        assert_eq!(round.net, 10);
    }
}
