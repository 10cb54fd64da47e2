mod game;
mod history;
mod key;
mod settings;

pub use game::{create_match, join_match, play_rounds, show_status};
pub use history::show_history;
pub use key::{handle_key_command, load_signer, KeyCommands};
pub use settings::{handle_config_command, ConfigCommands};
