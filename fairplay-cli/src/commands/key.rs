use crate::config::CliPaths;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use dialoguer::{Confirm, Password};
use fairplay_core::keys::generate_mnemonic;
use fairplay_core::{KeypairSigner, Signer};
use std::path::Path;

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a new key
    New {
        /// Overwrite an existing key without asking
        #[arg(short, long)]
        force: bool,
    },
    /// Show the address of the stored key
    Show,
    /// Import a key from a mnemonic
    Import {
        /// Mnemonic phrase (will prompt if not provided)
        #[arg(short, long)]
        mnemonic: Option<String>,
        /// Overwrite an existing key without asking
        #[arg(short, long)]
        force: bool,
    },
}

pub fn handle_key_command(cmd: KeyCommands, paths: &CliPaths) -> Result<()> {
    match cmd {
        KeyCommands::New { force } => {
            confirm_overwrite(paths, force)?;
            let mnemonic = generate_mnemonic()?;
            let signer = KeypairSigner::from_mnemonic(&mnemonic)?;
            write_key(&paths.key_file(), &mnemonic)?;

            println!("Key created successfully!");
            println!();
            println!("IMPORTANT: Save your mnemonic phrase securely!");
            println!("Mnemonic: {}", mnemonic);
            println!();
            println!("Address: {}", signer.address());
        }

        KeyCommands::Show => {
            let signer = load_signer(paths)?;
            println!("Address: {}", signer.address());
            println!("Key file: {}", paths.key_file().display());
        }

        KeyCommands::Import { mnemonic, force } => {
            confirm_overwrite(paths, force)?;
            let mnemonic = match mnemonic {
                Some(m) => m,
                None => Password::new()
                    .with_prompt("Enter mnemonic phrase")
                    .interact()
                    .context("Failed to read mnemonic")?,
            };

            let signer = KeypairSigner::from_mnemonic(mnemonic.trim())?;
            write_key(&paths.key_file(), mnemonic.trim())?;
            println!("Key imported successfully!");
            println!("Address: {}", signer.address());
        }
    }

    Ok(())
}

pub fn load_signer(paths: &CliPaths) -> Result<KeypairSigner> {
    let path = paths.key_file();
    if !path.exists() {
        bail!("No key found. Create one with: fairplay key new");
    }
    let mnemonic = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(KeypairSigner::from_mnemonic(mnemonic.trim())?)
}

fn confirm_overwrite(paths: &CliPaths, force: bool) -> Result<()> {
    if force || !paths.key_file().exists() {
        return Ok(());
    }
    let confirm = Confirm::new()
        .with_prompt("A key already exists. Replace it? This action cannot be undone.")
        .default(false)
        .interact()
        .context("Failed to read confirmation")?;
    if !confirm {
        bail!("Cancelled");
    }
    Ok(())
}

fn write_key(path: &Path, mnemonic: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, mnemonic)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
