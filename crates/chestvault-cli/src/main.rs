//! ChestVault CLI
//!
//! Inspect and edit persisted chest inventories.
//!
//! # Usage
//! ```bash
//! # Write a default config file
//! chestvault --config chestvault.yaml init
//!
//! # Put 20 stone in slot 5 of a chest, then show it
//! chestvault set 1b4e28ba-2fa1-11d2-883f-0016d3cca427 5 stone 20
//! chestvault show 1b4e28ba-2fa1-11d2-883f-0016d3cca427
//!
//! # Env vars override the config file
//! CHESTVAULT_ROOT_DIR=~/chests chestvault list
//! ```

use anyhow::{Context, bail};
use chestvault_cache::{ChestConfig, ChestService};
use chestvault_core::{EntityKey, Error, ItemStack, SlotIndex};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_PATH: &str = "chestvault.yaml";

#[derive(Parser)]
#[command(name = "chestvault")]
#[command(about = "ChestVault - persistent chest inventories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (YAML or TOML)
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "CHESTVAULT_CONFIG",
        global = true
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// Print every occupied slot of a chest
    Show {
        /// Chest key (UUID)
        key: String,
    },
    /// Put an item stack in a slot
    Set {
        /// Chest key (UUID)
        key: String,
        /// Slot index
        #[arg(allow_negative_numbers = true)]
        slot: SlotIndex,
        /// Item identifier
        item: String,
        /// Stack size
        quantity: i32,
    },
    /// Empty a slot
    Remove {
        /// Chest key (UUID)
        key: String,
        /// Slot index
        #[arg(allow_negative_numbers = true)]
        slot: SlotIndex,
    },
    /// Delete a chest's saved record
    Delete {
        /// Chest key (UUID)
        key: String,
    },
    /// List every chest saved on disk
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        let path = cli
            .config
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        return init_config(&path, force, &mut std::io::stdout());
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging.level)?;

    let service = ChestService::new(config).context("Failed to open chest storage")?;
    let mut out = std::io::stdout().lock();
    let result = run(&service, cli.command, &mut out);

    let stats = service.shutdown().await;
    debug!(saved = stats.saved, failed = stats.failed, "Final save");
    if stats.failed > 0 {
        bail!("{} chest(s) could not be saved", stats.failed);
    }
    result
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ChestConfig> {
    let mut config = match path {
        Some(path) => ChestConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ChestConfig::default(),
    };

    // Environment variables override the config file
    config.merge_env();
    Ok(config)
}

/// Log to stderr at the configured level unless `RUST_LOG` says otherwise
fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn init_config(path: &Path, force: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    ChestConfig::default()
        .write_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writeln!(out, "Wrote default configuration to {}", path.display())?;
    Ok(())
}

fn run(service: &ChestService, command: Commands, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => bail!("init does not open chest storage"),
        Commands::Show { key } => {
            // Read-only: bypass the cache so nothing gets written back
            let key = parse_key(&key)?;
            let record = service.cache().store().read(&key);

            if record.is_empty() {
                writeln!(out, "{} is empty", key)?;
            }
            for item in record.sorted_items() {
                writeln!(out, "{:>3}  {} x{}", item.slot, item.item_id, item.quantity)?;
            }
        }
        Commands::Set {
            key,
            slot,
            item,
            quantity,
        } => {
            let key = parse_key(&key)?;
            check_slot(service, slot)?;
            service.on_entity_ready(&key);
            let previous = service
                .open_container(&key)
                .set(slot, Some(ItemStack::new(item, quantity)));
            service.on_entity_leave(&key);

            match previous? {
                Some(old) => writeln!(
                    out,
                    "Slot {} replaced ({} x{})",
                    slot, old.item_id, old.quantity
                )?,
                None => writeln!(out, "Slot {} set", slot)?,
            }
        }
        Commands::Remove { key, slot } => {
            let key = parse_key(&key)?;
            check_slot(service, slot)?;
            service.on_entity_ready(&key);
            let previous = service.open_container(&key).remove(slot);
            service.on_entity_leave(&key);

            match previous? {
                Some(old) => writeln!(
                    out,
                    "Removed {} x{} from slot {}",
                    old.item_id, old.quantity, slot
                )?,
                None => writeln!(out, "Slot {} was already empty", slot)?,
            }
        }
        Commands::Delete { key } => {
            let key = parse_key(&key)?;
            let removed = service
                .cache()
                .store()
                .delete(&key)
                .with_context(|| format!("Failed to delete {}", key))?;

            if removed {
                writeln!(out, "Deleted {}", key)?;
            } else {
                writeln!(out, "{} has no saved record", key)?;
            }
        }
        Commands::List => {
            let keys = service
                .cache()
                .store()
                .list_keys()
                .context("Failed to list chests")?;
            for key in keys {
                writeln!(out, "{}", key)?;
            }
        }
    }

    Ok(())
}

/// Reject a bad slot before the chest is loaded, so a failed edit never
/// writes a record back
fn check_slot(service: &ChestService, slot: SlotIndex) -> anyhow::Result<()> {
    let capacity = service.cache().capacity();
    if slot < 0 || slot >= i32::from(capacity) {
        return Err(Error::IndexOutOfRange {
            index: slot,
            capacity,
        }
        .into());
    }
    Ok(())
}

fn parse_key(raw: &str) -> anyhow::Result<EntityKey> {
    EntityKey::from_string(raw).with_context(|| format!("'{}' is not a valid chest key", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service_in(temp_dir: &TempDir) -> ChestService {
        let config = ChestConfig {
            root_dir: temp_dir.path().join("chests"),
            ..ChestConfig::default()
        };
        ChestService::new(config).unwrap()
    }

    fn run_to_string(service: &ChestService, args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("chestvault").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(service, cli.command, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_cli_parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["chestvault", "list", "--config", "vault.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("vault.toml")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_set_show_remove() {
        let temp_dir = TempDir::new().unwrap();
        let service = service_in(&temp_dir);
        let key = EntityKey::new().to_string();

        let output = run_to_string(&service, &["set", &key, "5", "stone", "10"]).unwrap();
        assert_eq!(output, "Slot 5 set\n");
        let output = run_to_string(&service, &["set", &key, "5", "stone", "20"]).unwrap();
        assert_eq!(output, "Slot 5 replaced (stone x10)\n");

        let output = run_to_string(&service, &["show", &key]).unwrap();
        assert_eq!(output, "  5  stone x20\n");

        let output = run_to_string(&service, &["remove", &key, "5"]).unwrap();
        assert_eq!(output, "Removed stone x20 from slot 5\n");
        let output = run_to_string(&service, &["show", &key]).unwrap();
        assert_eq!(output, format!("{} is empty\n", key));

        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_set_out_of_range_fails() {
        let temp_dir = TempDir::new().unwrap();
        let service = service_in(&temp_dir);
        let key = EntityKey::new().to_string();

        assert!(run_to_string(&service, &["set", &key, "27", "stone", "1"]).is_err());
        assert!(run_to_string(&service, &["set", &key, "-1", "stone", "1"]).is_err());
        assert!(run_to_string(&service, &["remove", &key, "99"]).is_err());

        // Rejected edits leave nothing behind on disk
        assert!(service.cache().is_empty());
        assert_eq!(run_to_string(&service, &["list"]).unwrap(), "");
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let service = service_in(&temp_dir);

        let err = run_to_string(&service, &["show", "not-a-uuid"]).unwrap_err();
        assert!(err.to_string().contains("not a valid chest key"));
    }

    #[test]
    fn test_list_shows_saved_chests() {
        let temp_dir = TempDir::new().unwrap();
        let service = service_in(&temp_dir);
        let a = EntityKey::new();
        let b = EntityKey::new();

        run_to_string(&service, &["set", &a.to_string(), "0", "dirt", "1"]).unwrap();
        run_to_string(&service, &["set", &b.to_string(), "0", "dirt", "1"]).unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        let expected: String = expected.iter().map(|key| format!("{}\n", key)).collect();
        assert_eq!(run_to_string(&service, &["list"]).unwrap(), expected);
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let service = service_in(&temp_dir);
        let key = EntityKey::new().to_string();

        run_to_string(&service, &["set", &key, "2", "wool", "5"]).unwrap();
        let output = run_to_string(&service, &["delete", &key]).unwrap();
        assert_eq!(output, format!("Deleted {}\n", key));
        let output = run_to_string(&service, &["delete", &key]).unwrap();
        assert_eq!(output, format!("{} has no saved record\n", key));
        assert_eq!(run_to_string(&service, &["list"]).unwrap(), "");
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chestvault.toml");
        let mut out = Vec::new();

        init_config(&path, false, &mut out).unwrap();
        assert_eq!(ChestConfig::from_file(&path).unwrap(), ChestConfig::default());
        assert!(init_config(&path, false, &mut out).is_err());
        assert!(init_config(&path, true, &mut out).is_ok());
    }
}
