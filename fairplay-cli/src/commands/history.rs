use crate::config::CliPaths;
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use fairplay_core::{HistoryStore, Storage};

pub async fn show_history(paths: &CliPaths, limit: usize) -> Result<()> {
    let storage = Storage::new(&paths.history_db()).await?;
    let store = HistoryStore::new(&storage);
    let rounds = store.list_rounds(limit).await?;

    if rounds.is_empty() {
        println!("No settled rounds yet.");
        println!("Start one with: fairplay create <wager>");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Match", "Wager", "You", "Opponent", "Outcome", "Net", "Settled"]);
    for round in &rounds {
        table.add_row(vec![
            round.match_id.to_string(),
            round.wager.to_string(),
            round.my_move.clone(),
            round.opponent_move.clone().unwrap_or_else(|| "-".to_string()),
            round.outcome.clone(),
            format!("{:+}", round.net),
            round.settled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{}", table);

    let totals = store.totals().await?;
    println!(
        "Wins: {}  Draws: {}  Losses: {}  Net: {:+}",
        totals.wins, totals.draws, totals.losses, totals.net
    );
    Ok(())
}
