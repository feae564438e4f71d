use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod auth;
use cardvault::{
    Backend, Card, CardDetails, CardDraft, CardId, CardType, CardVault, FileBackend,
    NoAuthenticator, PresenceGate, VaultError, default_backend, masked,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter, e.g. `CARDVAULT_LOG=cardvault=debug`.
const LOG_ENV: &str = "CARDVAULT_LOG";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn open_vault(path: Option<PathBuf>) -> Result<CardVault<FileBackend>> {
    let backend = match path {
        Some(p) => FileBackend::open(p)?,
        None => default_backend()?,
    };
    Ok(CardVault::new(backend))
}

fn unlock(vault: &mut CardVault<FileBackend>) -> Result<()> {
    if !vault.is_provisioned()? {
        bail!("vault is not set up; run `cardvault init` first");
    }
    let pin = auth::read_pin()?;
    vault.unlock_with_pin(&pin).map_err(unlock_error)
}

/// Errors the user cannot fix by retrying get a pointer to `reset`.
fn unlock_error(e: VaultError) -> anyhow::Error {
    if e.is_recoverable() {
        e.into()
    } else {
        anyhow::Error::new(e)
            .context("vault cannot be unlocked; run `cardvault reset --yes` to start over")
    }
}

#[derive(Debug, Parser)]
#[command(name = "cardvault")]
#[command(version, about = "Offline, PIN-protected payment card vault.")]
struct Cli {
    /// Path to the vault file
    #[arg(long, global = true, value_name = "PATH", env = "CARDVAULT_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct CardArgs {
    /// Card type: credit or debit
    #[arg(long = "type", value_name = "TYPE")]
    kind: Option<CardType>,

    #[arg(long)]
    nickname: Option<String>,

    /// Full card number
    #[arg(long)]
    number: Option<String>,

    /// Name printed on the card
    #[arg(long)]
    holder: Option<String>,

    /// Issuing bank
    #[arg(long)]
    issuer: Option<String>,

    /// MM/YY
    #[arg(long)]
    valid_from: Option<String>,

    /// MM/YY
    #[arg(long)]
    valid_thru: Option<String>,

    #[arg(long)]
    cvv: Option<String>,

    /// Display color, e.g. #1e3a8a
    #[arg(long)]
    color: Option<String>,
}

impl CardArgs {
    /// Overwrite the fields that were given on the command line.
    fn apply(self, details: &mut CardDetails) {
        let CardArgs {
            kind: _,
            nickname,
            number,
            holder,
            issuer,
            valid_from,
            valid_thru,
            cvv,
            color,
        } = self;

        let fields = [
            (nickname, &mut details.nickname),
            (number, &mut details.number),
            (holder, &mut details.holder_name),
            (issuer, &mut details.issuer_name),
            (valid_from, &mut details.valid_from),
            (valid_thru, &mut details.valid_thru),
            (cvv, &mut details.cvv),
            (color, &mut details.display_color),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates the vault and sets its PIN
    Init,

    /// Stores a new card
    Add {
        #[command(flatten)]
        card: CardArgs,
    },

    /// Updates fields of an existing card
    #[command(arg_required_else_help = true)]
    Edit {
        id: CardId,
        #[command(flatten)]
        card: CardArgs,
    },

    /// Lists stored cards with masked numbers
    List {
        /// Only show cards of this type
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<CardType>,
    },

    /// Shows one card
    #[command(arg_required_else_help = true)]
    Show {
        id: CardId,
        /// Print the full number and CVV
        #[arg(long, default_value_t = false)]
        reveal: bool,
    },

    /// Removes a card
    #[command(arg_required_else_help = true)]
    Remove { id: CardId },

    /// Changes the vault PIN
    ChangePin,

    /// Manages biometric unlock
    #[command(subcommand)]
    Biometric(BiometricCommand),

    /// Shows or updates the owner profile
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Deletes the vault and everything in it
    Reset {
        /// Confirm the reset
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Shows information about the vault
    Info,
}

#[derive(Debug, Subcommand)]
enum BiometricCommand {
    Enable,
    Disable,
    Status,
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    Show,
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
}

fn print_card(card: &Card, reveal: bool) {
    let d = &card.details;
    let number = if reveal { d.number.clone() } else { masked(&d.number) };

    println!("id:         {}", card.id);
    println!("type:       {}", card.kind);
    println!("nickname:   {}", d.nickname);
    println!("number:     {number}");
    println!("holder:     {}", d.holder_name);
    println!("issuer:     {}", d.issuer_name);
    println!("valid from: {}", d.valid_from);
    println!("valid thru: {}", d.valid_thru);
    if reveal {
        println!("cvv:        {}", d.cvv);
    }
    println!("updated:    {}", card.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_table(cards: &[Card]) {
    let rows: Vec<[String; 4]> = cards
        .iter()
        .map(|c| {
            [
                c.id.to_string(),
                c.kind.to_string(),
                c.details.nickname.clone(),
                masked(&c.details.number),
            ]
        })
        .collect();

    let header = ["Id", "Type", "Nickname", "Number"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }
    let [w0, w1, w2, w3] = widths;

    println!(
        "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}",
        header[0], header[1], header[2], header[3]
    );
    println!("{:-<w0$}  {:-<w1$}  {:-<w2$}  {:-<w3$}", "", "", "", "");
    for [id, kind, nickname, number] in rows {
        println!("{id:<w0$}  {kind:<w1$}  {nickname:<w2$}  {number:<w3$}");
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let mut vault = open_vault(args.store)?;
    let gate = NoAuthenticator;

    match args.command {
        Commands::Init => {
            if vault.is_provisioned()? {
                bail!("vault is already set up; run `cardvault reset --yes` to start over");
            }
            let pin = auth::read_new_pin_with_confirmation(auth::PIN_ENV)?;
            vault.setup_pin(&pin)?;
            println!("vault initialized");
        }
        Commands::Add { card } => {
            unlock(&mut vault)?;
            let kind = card.kind.context("--type is required when adding a card")?;
            let mut details = CardDetails::default();
            card.apply(&mut details);
            if details.number.is_empty() {
                bail!("--number is required when adding a card");
            }
            let saved = vault.save_card(CardDraft::new(kind, details))?;
            println!("stored card {} ({})", saved.id, masked(&saved.details.number));
        }
        Commands::Edit { id, card } => {
            unlock(&mut vault)?;
            let mut draft = vault.card(id)?.into_draft();
            if let Some(kind) = card.kind {
                draft.kind = kind;
            }
            card.apply(&mut draft.details);
            let saved = vault.save_card(draft)?;
            println!("card {} updated", saved.id);
        }
        Commands::List { kind } => {
            unlock(&mut vault)?;
            let cards = vault.cards(kind)?;
            if cards.is_empty() {
                println!("No cards stored.");
            } else {
                print_table(&cards);
            }
        }
        Commands::Show { id, reveal } => {
            unlock(&mut vault)?;
            let card = vault.card(id)?;
            print_card(&card, reveal);
        }
        Commands::Remove { id } => {
            vault.delete_card(id)?;
            println!("card {id} removed");
        }
        Commands::ChangePin => {
            if !vault.is_provisioned()? {
                bail!("vault is not set up; run `cardvault init` first");
            }
            let current = auth::read_pin()?;
            vault.unlock_with_pin(&current).map_err(unlock_error)?;
            let new_pin = auth::read_new_pin_with_confirmation(auth::NEW_PIN_ENV)?;
            vault.change_pin(&current, &new_pin)?;
            println!("PIN changed");
        }
        Commands::Biometric(BiometricCommand::Enable) => {
            let pin = auth::read_pin()?;
            vault.unlock_with_pin(&pin).map_err(unlock_error)?;
            vault.enable_biometric(&gate, &pin)?;
            println!("biometric unlock enabled");
        }
        Commands::Biometric(BiometricCommand::Disable) => {
            let pin = auth::read_pin()?;
            vault.unlock_with_pin(&pin).map_err(unlock_error)?;
            vault.disable_biometric(&pin)?;
            println!("biometric unlock disabled");
        }
        Commands::Biometric(BiometricCommand::Status) => {
            let enabled = if vault.biometric_enabled()? { "yes" } else { "no" };
            let available = if gate.is_available() { "yes" } else { "no" };
            println!("enabled:   {enabled}");
            println!("available: {available}");
        }
        Commands::Profile(ProfileCommand::Show) => {
            let profile = vault.profile()?;
            println!("name:  {}", profile.name);
            println!("email: {}", profile.email);
        }
        Commands::Profile(ProfileCommand::Set { name, email }) => {
            vault.save_profile(&name, &email)?;
            println!("profile updated");
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset deletes every card; pass --yes to confirm");
            }
            vault.reset()?;
            println!("vault reset");
        }
        Commands::Info => {
            let backend = vault.backend();
            let credential = backend.credential()?;

            println!("Path: {}", backend.path().display());
            println!("Set up: {}", if credential.is_some() { "yes" } else { "no" });
            println!("Cards: {}", backend.cards()?.len());
            if let Some(record) = credential {
                println!(
                    "Biometric: {}",
                    if record.biometric_enabled() { "enabled" } else { "disabled" }
                );
                println!(
                    "PIN updated: {}",
                    record.updated_at().format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    Ok(())
}
