use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use platinum_tracker_core::{
    assemble, decode_token, encode_token, DerivedTheme, MetadataSource, NewRecordRequest,
    PlayerRank, ProfileSlot, RecordId, SettingsConfig,
};
use platinum_tracker_rawg::RawgClient;
use platinum_tracker_store_sqlite::SqliteStore;
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "plat")]
#[command(about = "Platinum completion tracker CLI")]
struct Cli {
    #[arg(long, default_value = "./platinum_tracker.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Game {
        #[command(subcommand)]
        command: Box<GameCommand>,
    },
    Config {
        #[command(subcommand)]
        command: Box<ConfigCommand>,
    },
    Profile {
        #[command(subcommand)]
        command: Box<ProfileCommand>,
    },
    Rank(RankArgs),
    Transfer {
        #[command(subcommand)]
        command: Box<TransferCommand>,
    },
}

#[derive(Debug, Subcommand)]
enum GameCommand {
    Add(GameAddArgs),
    List,
    Remove(GameRemoveArgs),
}

#[derive(Debug, Args)]
struct GameAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    platform: String,
    /// Skip the metadata lookup even when an API key is configured.
    #[arg(long, default_value_t = false)]
    no_enrich: bool,
}

#[derive(Debug, Args)]
struct GameRemoveArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Set(ConfigSetArgs),
    Reset,
}

#[derive(Debug, Args)]
struct ConfigSetArgs {
    #[arg(long)]
    primary: Option<String>,
    #[arg(long)]
    secondary: Option<String>,
    #[arg(long)]
    bg: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Show(ProfileShowArgs),
    Set(ProfileSetArgs),
}

#[derive(Debug, Args)]
struct ProfileShowArgs {
    #[arg(long)]
    slot: u8,
}

#[derive(Debug, Args)]
struct ProfileSetArgs {
    #[arg(long)]
    slot: u8,
    #[arg(long)]
    platform: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
    #[arg(long)]
    url: Option<String>,
}

#[derive(Debug, Args)]
struct RankArgs {
    /// Report the theme primary color instead of the ladder color.
    #[arg(long, default_value_t = false)]
    neutral: bool,
}

#[derive(Debug, Subcommand)]
enum TransferCommand {
    Export,
    Import(TransferImportArgs),
}

#[derive(Debug, Args)]
struct TransferImportArgs {
    #[arg(long)]
    token: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    colog::init();
    let cli = Cli::parse();
    let mut store = open_store(&cli.db)?;

    match cli.command {
        Command::Game { command } => run_game(*command, &mut store),
        Command::Config { command } => run_config(*command, &mut store),
        Command::Profile { command } => run_profile(*command, &mut store),
        Command::Rank(args) => run_rank(&args, &store),
        Command::Transfer { command } => run_transfer(*command, &mut store),
    }
}

fn open_store(db: &std::path::Path) -> Result<SqliteStore> {
    let mut store = SqliteStore::open(db)?;
    store.migrate()?;
    Ok(store)
}

fn run_game(command: GameCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        GameCommand::Add(args) => {
            let config = store.load_config()?;
            let client = (!args.no_enrich && !config.api_key.trim().is_empty())
                .then(|| RawgClient::new(config.api_key.clone()));
            let source = client.as_ref().map(|client| client as &dyn MetadataSource);

            let request = NewRecordRequest { name: args.name, platform: args.platform };
            let assembled = assemble(&request, source)?;
            if let Some(warning) = &assembled.warning {
                log::warn!("{warning}");
            }

            store.insert_newest(&assembled.record)?;
            emit_json(serde_json::json!({
                "game": record_value(&assembled.record)?,
                "enriched": source.is_some(),
                "warning": assembled.warning,
            }))
        }
        GameCommand::List => {
            let records = store.list_records()?;
            emit_json(serde_json::json!({
                "count": records.len(),
                "games": records,
            }))
        }
        GameCommand::Remove(args) => {
            let removed = store.delete_record(RecordId(args.id))?;
            if !removed {
                return Err(anyhow!("no record found with id {}", args.id));
            }
            emit_json(serde_json::json!({
                "removed_id": args.id,
                "remaining": store.list_records()?.len(),
            }))
        }
    }
}

fn run_config(command: ConfigCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = store.load_config()?;
            let theme = DerivedTheme::from_config(&config);
            emit_json(serde_json::json!({
                "config": config,
                "theme": theme,
            }))
        }
        ConfigCommand::Set(args) => {
            let mut config = store.load_config()?;
            if let Some(primary) = args.primary {
                config.primary_color = primary;
            }
            if let Some(secondary) = args.secondary {
                config.secondary_color = secondary;
            }
            if let Some(bg) = args.bg {
                config.background_color = bg;
            }
            if let Some(api_key) = args.api_key {
                config.api_key = api_key;
            }

            store.save_config(&config)?;
            let theme = DerivedTheme::from_config(&config);
            emit_json(serde_json::json!({
                "config": config,
                "theme": theme,
            }))
        }
        ConfigCommand::Reset => {
            let config = SettingsConfig::default();
            store.save_config(&config)?;
            emit_json(serde_json::json!({
                "config": config,
                "theme": DerivedTheme::from_config(&config),
            }))
        }
    }
}

fn run_profile(command: ProfileCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        ProfileCommand::Show(args) => {
            let slot = parse_slot(args.slot)?;
            let profile = store.load_profile(slot)?;
            emit_json(serde_json::json!({
                "slot": slot.index(),
                "profile": profile,
            }))
        }
        ProfileCommand::Set(args) => {
            let slot = parse_slot(args.slot)?;
            let mut profile = store.load_profile(slot)?;
            if let Some(platform) = args.platform {
                profile.platform = platform;
            }
            if let Some(name) = args.name {
                profile.name = name;
            }
            if let Some(level) = args.level {
                profile.level = level;
            }
            if let Some(avatar) = args.avatar {
                profile.avatar = avatar;
            }
            if let Some(url) = args.url {
                profile.url = url;
            }

            store.save_profile(slot, profile)?;
            emit_json(serde_json::json!({
                "slot": slot.index(),
                "profile": store.load_profile(slot)?,
            }))
        }
    }
}

fn run_rank(args: &RankArgs, store: &SqliteStore) -> Result<()> {
    let count = store.list_records()?.len();
    let rank = PlayerRank::for_count(count);
    let config = store.load_config()?;
    let neutral = args.neutral.then_some(config.primary_color.as_str());

    emit_json(serde_json::json!({
        "count": count,
        "title": rank.title,
        "color": rank.display_color(neutral),
    }))
}

fn run_transfer(command: TransferCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        TransferCommand::Export => {
            let bundle = store.export_bundle()?;
            let token = encode_token(&bundle)?;
            emit_json(serde_json::json!({
                "token": token,
                "games": bundle.games.len(),
                "profile1": bundle.profile1.is_some(),
                "profile2": bundle.profile2.is_some(),
                "config": bundle.config.is_some(),
            }))
        }
        TransferCommand::Import(args) => {
            let bundle = decode_token(&args.token)?;
            store.import_bundle(&bundle)?;
            emit_json(serde_json::json!({
                "imported_games": bundle.games.len(),
                "profile1": bundle.profile1.is_some(),
                "profile2": bundle.profile2.is_some(),
                "config": bundle.config.is_some(),
            }))
        }
    }
}

fn parse_slot(index: u8) -> Result<ProfileSlot> {
    ProfileSlot::from_index(index)
        .ok_or_else(|| anyhow!("profile slot must be 1 or 2 (received: {index})"))
}

fn record_value(record: &platinum_tracker_core::CompletionRecord) -> Result<Value> {
    serde_json::to_value(record).context("failed to serialize completion record")
}
