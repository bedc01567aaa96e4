//! Offline SCP02 calculator
//!
//! Reproduces the values of a recorded SCP02 exchange: session keys,
//! handshake cryptograms, wrapped commands and verified responses.

use clap::{Parser, Subcommand};
use gpcard_apdu_core::{ApduCommand, Command, Response};
use gpcard_scp02::{
    DefaultKeys, DerivationContext, DerivationStrategy, KeyUsage, ScpParameters, SecureMessaging,
    SecurityLevel, SessionKeys, StaticKey, StaticKeys,
    constants::{key_id, scp},
    crypto::{calculate_cryptogram, key_check_value},
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base key (hex, 16 or 24 bytes); defaults to the 404142..4F test key
    #[arg(short, long)]
    key: Option<String>,

    /// Sequence counter reported by the card (hex)
    #[arg(short, long, value_parser = parse_hex::<2>)]
    sequence_counter: [u8; 2],

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the session keys and their check values
    DeriveKeys,

    /// Print the card and host cryptograms of a handshake
    Cryptogram {
        /// Card challenge (hex, 6 bytes)
        #[arg(long, value_parser = parse_hex::<6>)]
        card_challenge: [u8; 6],

        /// Host challenge (hex, 8 bytes)
        #[arg(long, value_parser = parse_hex::<8>)]
        host_challenge: [u8; 8],
    },

    /// Wrap a command
    Wrap {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Command APDU (hex)
        apdu: String,
    },

    /// Wrap a command and verify the R-MAC of its response
    Unwrap {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Command APDU the response belongs to (hex)
        apdu: String,

        /// Response APDU including status word (hex)
        response: String,
    },
}

#[derive(Debug, clap::Args)]
struct ChannelArgs {
    /// Security level bits (hex), e.g. 01 for C-MAC or 13 for C-MAC, C-DEC and R-MAC
    #[arg(short, long, value_parser = parse_hex::<1>, default_value = "01")]
    level: [u8; 1],

    /// "i" parameter (hex)
    #[arg(short, long, value_parser = parse_hex::<1>, default_value = "15")]
    parameter: [u8; 1],

    /// Chaining value seeding ICV and R-ICV (hex); omit for a fresh channel
    #[arg(long, value_parser = parse_hex::<8>)]
    icv: Option<[u8; 8]>,
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

fn session_keys(cli: &Cli) -> Result<SessionKeys, Box<dyn std::error::Error>> {
    let provider = match &cli.key {
        Some(key) => StaticKeys::from_single_key(0, StaticKey::from_slice(&hex::decode(key)?)?),
        None => DefaultKeys::key_set(),
    };
    let context = DerivationContext {
        sequence_counter: cli.sequence_counter,
        key_version: 0,
    };
    let strategy = DerivationStrategy::SingleBaseKey {
        key_id: key_id::ENC,
    };
    Ok(SessionKeys::derive(&provider, strategy, &context)?)
}

fn open_channel(cli: &Cli, args: &ChannelArgs) -> Result<SecureMessaging, Box<dyn std::error::Error>> {
    Ok(SecureMessaging::new(
        session_keys(cli)?,
        ScpParameters::new(args.parameter[0]),
        SecurityLevel::from_bits(args.level[0])?,
        args.icv,
        scp::DEFAULT_MAX_APDU_DATA_LENGTH,
    )?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the tracing logger with env_format and ansi
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(true)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::DeriveKeys => {
            let keys = session_keys(&cli)?;
            for usage in KeyUsage::ALL {
                let key = keys.get(usage);
                println!(
                    "{:<5} {}  KCV {}",
                    format!("{usage:?}"),
                    hex::encode_upper(&key.as_bytes()[..16]),
                    hex::encode_upper(key_check_value(key.as_bytes())?)
                );
            }
        }
        Commands::Cryptogram {
            card_challenge,
            host_challenge,
        } => {
            let keys = session_keys(&cli)?;
            let seq = &cli.sequence_counter;
            let card = calculate_cryptogram(keys.enc(), seq, card_challenge, host_challenge, false)?;
            let host = calculate_cryptogram(keys.enc(), seq, card_challenge, host_challenge, true)?;
            println!("Card cryptogram: {}", hex::encode_upper(card));
            println!("Host cryptogram: {}", hex::encode_upper(host));
        }
        Commands::Wrap { channel, apdu } => {
            let mut sm = open_channel(&cli, channel)?;
            let wrapped = sm.wrap(&Command::from_bytes(&hex::decode(apdu)?)?)?;
            println!("{}", hex::encode_upper(wrapped.to_bytes()?));
            if let Some(icv) = sm.icv() {
                println!("ICV: {}", hex::encode_upper(icv));
            }
        }
        Commands::Unwrap {
            channel,
            apdu,
            response,
        } => {
            let mut sm = open_channel(&cli, channel)?;
            sm.wrap(&Command::from_bytes(&hex::decode(apdu)?)?)?;
            let unwrapped = sm.unwrap(Response::from_bytes(&hex::decode(response)?)?)?;
            println!(
                "{} {}",
                hex::encode_upper(unwrapped.payload()),
                unwrapped.status()
            );
            println!("R-ICV: {}", hex::encode_upper(sm.r_icv()));
        }
    }

    Ok(())
}
