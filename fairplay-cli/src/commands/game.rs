use crate::commands::load_signer;
use crate::config::{load_client_config, CliPaths, Overrides};
use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Select;
use fairplay_core::{
    HistoryStore, HttpLedger, KeypairSigner, LedgerReader, MatchId, Signer, Storage,
};
use fairplay_match::{
    classify, storage_key, MatchClient, MatchError, MatchRecord, MatchSession, Move, RemotePhase,
    Settlement,
};
use std::sync::Arc;

type Client = MatchClient<HttpLedger, KeypairSigner>;

const REVEAL_ATTEMPTS: usize = 3;

struct PlayerContext {
    client: Client,
    storage: Storage,
}

async fn connect(paths: &CliPaths, overrides: &Overrides) -> Result<PlayerContext> {
    let config = load_client_config(paths, overrides)?;
    let ledger = Arc::new(HttpLedger::new(&config)?);
    let signer = Arc::new(load_signer(paths)?);
    let storage = Storage::new(&paths.history_db()).await?;

    Ok(PlayerContext {
        client: MatchClient::new(&config, ledger, signer),
        storage,
    })
}

pub async fn create_match(
    paths: &CliPaths,
    overrides: &Overrides,
    wager: u64,
    chosen: Option<String>,
) -> Result<()> {
    let ctx = connect(paths, overrides).await?;
    let mut session = MatchSession::new();
    let settlement = create_and_play(&ctx, &mut session, wager, chosen.as_deref()).await?;
    print_settlement(&settlement);
    Ok(())
}

pub async fn join_match(
    paths: &CliPaths,
    overrides: &Overrides,
    match_id: &str,
    chosen: Option<String>,
) -> Result<()> {
    let ctx = connect(paths, overrides).await?;
    let mut session = MatchSession::new();

    println!("Joining match {}...", match_id);
    match ctx.client.join_str(&mut session, match_id).await {
        Ok(wager) => println!("Joined! Wager: {}", wager),
        Err(MatchError::ReadBackFailed { match_id, source }) => {
            println!("Joined match {}, but it could not be read back: {}", match_id, source);
        }
        Err(e) => return Err(e.into()),
    }

    let settlement = play_round(&ctx, &mut session, chosen.as_deref()).await?;
    print_settlement(&settlement);
    Ok(())
}

/// Creates and plays `rounds` matches back to back in one session.
pub async fn play_rounds(
    paths: &CliPaths,
    overrides: &Overrides,
    wager: u64,
    rounds: u32,
    chosen: Option<String>,
) -> Result<()> {
    let ctx = connect(paths, overrides).await?;
    let mut session = MatchSession::new();

    for round in 1..=rounds {
        println!("Round {}/{}", round, rounds);
        let settlement = create_and_play(&ctx, &mut session, wager, chosen.as_deref()).await?;
        print_settlement(&settlement);

        if round < rounds {
            ctx.client.recycle_after_settlement(&mut session).await;
        }
    }

    let net: i64 = session.history().iter().filter_map(|e| e.net).sum();
    println!();
    println!("Session net over {} round(s): {:+}", session.history().len(), net);
    Ok(())
}

async fn create_and_play(
    ctx: &PlayerContext,
    session: &mut MatchSession,
    wager: u64,
    chosen: Option<&str>,
) -> Result<Settlement> {
    println!("Creating match with wager {}...", wager);
    let match_id = match ctx.client.create(session, wager).await {
        Ok(match_id) => match_id,
        Err(MatchError::ReadBackFailed { match_id, source }) => {
            println!("Match {} confirmed but not verified: {}", match_id, source);
            match_id
        }
        Err(e) => return Err(e.into()),
    };
    println!("Match ID: {}", match_id);
    println!();
    println!("Share this command with another player:");
    println!("fairplay join {}", match_id);
    println!();
    println!("Waiting for an opponent...");

    let opponent = ctx.client.wait_for_opponent(session).await?;
    println!("Opponent joined: {}", opponent);

    play_round(ctx, session, chosen).await
}

async fn play_round(
    ctx: &PlayerContext,
    session: &mut MatchSession,
    chosen: Option<&str>,
) -> Result<Settlement> {
    let chosen = choose_move(chosen)?;
    ctx.client.commit(session, chosen).await?;
    println!("Committed {}. Waiting for the opponent's commitment...", chosen);

    ctx.client.wait_for_commitments(session).await?;
    let settlement = reveal_with_retry(ctx, session).await?;

    let player = ctx.client.address();
    if let Some(round) = session
        .history()
        .iter()
        .rev()
        .find(|e| e.match_id == settlement.match_id)
        .and_then(|e| e.to_round_record(player))
    {
        HistoryStore::new(&ctx.storage).record_round(&round).await?;
    }

    Ok(settlement)
}

/// Secrets only live in this process, so a failed reveal is retried here
/// rather than left for a later invocation.
async fn reveal_with_retry(ctx: &PlayerContext, session: &mut MatchSession) -> Result<Settlement> {
    let mut attempt = 1;
    loop {
        match ctx.client.reveal(session).await {
            Ok(settlement) => return Ok(settlement),
            Err(e) if e.is_recoverable() && attempt < REVEAL_ATTEMPTS => {
                tracing::warn!("Reveal attempt {} failed: {}", attempt, e);
                tokio::time::sleep(ctx.client.poll_interval()).await;
                if let Some(settlement) = ctx.client.reconcile(session).await? {
                    return Ok(settlement);
                }
                attempt += 1;
            }
            Err(e) => return Err(e).context("Reveal failed"),
        }
    }
}

fn choose_move(chosen: Option<&str>) -> Result<Move> {
    if let Some(label) = chosen {
        return Ok(label.parse::<Move>()?);
    }

    let labels: Vec<&str> = Move::ALL.iter().map(|m| m.label()).collect();
    let index = Select::new()
        .with_prompt("Choose your move")
        .items(&labels)
        .default(0)
        .interact()
        .context("Failed to read move")?;
    Move::ALL
        .get(index)
        .copied()
        .ok_or_else(|| MatchError::InvalidMove(index.to_string()).into())
}

fn print_settlement(settlement: &Settlement) {
    println!();
    println!("Match {} settled", settlement.match_id);
    if let Some(opponent) = settlement.opponent_move {
        println!("  Opponent played: {}", opponent);
    }
    println!("  Outcome: {}", settlement.outcome);
    println!("  Payout: {}x wager", settlement.multiplier);
    println!("  Net: {:+}", settlement.net);
}

pub async fn show_status(paths: &CliPaths, overrides: &Overrides, match_id: &str) -> Result<()> {
    let config = load_client_config(paths, overrides)?;
    let match_id: MatchId = match_id.parse()?;
    let ledger = HttpLedger::new(&config)?;
    let local = load_signer(paths).ok().map(|s| s.address());

    let bytes = ledger
        .read_record(&storage_key(match_id))
        .await?
        .with_context(|| format!("Match {} not found", match_id))?;
    let record = MatchRecord::decode(&bytes)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Match".to_string(), match_id.to_string()]);
    table.add_row(vec!["Player 1".to_string(), record.player1.to_string()]);
    table.add_row(vec!["Player 2".to_string(), seat(&record)]);
    table.add_row(vec!["Wager".to_string(), record.wager.to_string()]);
    table.add_row(vec!["State".to_string(), format!("{:?}", record.remote_phase())]);
    table.add_row(vec![
        "Commitment 1".to_string(),
        record.commitment1.to_string(),
    ]);
    table.add_row(vec![
        "Commitment 2".to_string(),
        record.commitment2.to_string(),
    ]);
    table.add_row(vec!["Move 1".to_string(), move_name(record.move1)]);
    table.add_row(vec!["Move 2".to_string(), move_name(record.move2)]);
    table.add_row(vec!["Winner".to_string(), record.winner.to_string()]);

    if let Some(local) = local.filter(|a| record.is_player(a)) {
        if record.remote_phase() == RemotePhase::Resolved {
            let outcome = classify(&record, &local, &config.protocol_address());
            table.add_row(vec!["Your outcome".to_string(), outcome.to_string()]);
        }
    }

    println!("{}", table);
    Ok(())
}

fn seat(record: &MatchRecord) -> String {
    if record.has_opponent() {
        record.player2.to_string()
    } else {
        "(open)".to_string()
    }
}

fn move_name(ordinal: u64) -> String {
    Move::from_ordinal(ordinal)
        .map(|m| m.label().to_string())
        .unwrap_or_else(|| "-".to_string())
}
