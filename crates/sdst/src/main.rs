//! `sdst` — multi-key signing for JSON sign requests and plain text.

mod keys;
mod sign;
mod store;
mod verify;

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

use crate::store::Store;

/// Manage signing keys and sign or verify JSON sign requests and plain text.
#[derive(Parser)]
#[command(name = "sdst", version)]
struct Cli {
    /// Key database file (defaults to the configured path).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Password of an encrypted key database. New databases are written
    /// encrypted when given.
    #[arg(long, global = true, env = "SDST_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Settings file (defaults to $XDG_CONFIG_HOME/sdst/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new key pair.
    Keygen {
        /// Algorithm, e.g. ed25519, rsa2048, prime256v1, secp256k1.
        #[arg(default_value = "ed25519")]
        algorithm: String,
        #[arg(long)]
        alias: Option<String>,
        /// Extra entropy mixed into key generation.
        #[arg(long)]
        entropy: Option<String>,
    },

    /// Import a public key or a private key (PKCS#8, SEC1 or PKCS#1) from a PEM file.
    Import {
        file: PathBuf,
        #[arg(long)]
        alias: Option<String>,
        /// Replace a stored key with the same key id.
        #[arg(long)]
        overwrite: bool,
    },

    /// List stored keys.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Rename a key.
    Alias {
        /// Alias, key id or key id prefix.
        key: String,
        alias: String,
    },

    /// Delete a key.
    Delete {
        /// Alias, key id or key id prefix.
        key: String,
    },

    /// Check that a key pair's halves belong together.
    Validate {
        /// Alias, key id or key id prefix.
        key: String,
    },

    /// Sign a JSON sign request or plain text.
    Sign {
        /// Signing key: alias, key id or key id prefix.
        #[arg(long)]
        key: Option<String>,
        /// Input file (defaults to stdin).
        input: Option<PathBuf>,
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Treat the input as plain text even if it is a JSON sign request.
        #[arg(long)]
        plain: bool,
        /// Digest method (default sha256, ignored by EdDSA keys).
        #[arg(long)]
        digest: Option<String>,
        /// Name the signer by key id instead of embedding the public key.
        #[arg(long)]
        key_id: bool,
        /// Extra entropy for ECDSA nonces.
        #[arg(long)]
        entropy: Option<String>,
    },

    /// Verify a JSON sign request or signed plain text.
    Verify {
        /// Input file (defaults to stdin).
        input: Option<PathBuf>,
        /// Print the annotated result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export the key database, or one public key with --key.
    Export {
        /// Export this key's public key instead of the database.
        #[arg(long)]
        key: Option<String>,
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Write the database unencrypted even when a password is set.
        #[arg(long)]
        plain: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sdst=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut store = Store::open(cli.config.as_deref(), cli.database, cli.password)?;

    match cli.command {
        Command::Keygen {
            algorithm,
            alias,
            entropy,
        } => keys::keygen(&mut store, &algorithm, alias.as_deref(), entropy.as_deref()),
        Command::Import { file, alias, overwrite } => keys::import(&mut store, &file, alias.as_deref(), overwrite),
        Command::List { json } => keys::list(&store, json),
        Command::Alias { key, alias } => keys::alias(&mut store, &key, &alias),
        Command::Delete { key } => keys::delete(&mut store, &key),
        Command::Validate { key } => keys::validate(&store, &key),
        Command::Sign {
            key,
            input,
            output,
            plain,
            digest,
            key_id,
            entropy,
        } => sign::run(
            &store,
            &sign::SignArgs {
                key: key.as_deref(),
                input: input.as_deref(),
                output: output.as_deref(),
                plain,
                digest: digest.as_deref(),
                key_id,
                entropy: entropy.as_deref(),
            },
        ),
        Command::Verify { input, json } => verify::run(&store, input.as_deref(), json),
        Command::Export { key, output, plain } => keys::export(&store, key.as_deref(), output.as_deref(), plain),
    }
}
