//! sealkit: seal transient session state to disk
//!
//! Commands:
//!   seal <input> <output>     - encrypt a file, saving the session key to the bundle
//!   unseal <input> <output>   - decrypt a file using the key from the bundle
//!   inspect                   - show what the bundle holds (never the key itself)
//!   forget                    - delete the bundle, ending the session
//!   config show               - display current configuration
//!
//! Sealed files are only readable while the bundle exists: `forget` makes
//! every file sealed in that session unreadable.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sealkit_core::config::SealkitConfig;
use sealkit_core::{BundleFile, MemoryBundle};
use sealkit_crypto::{CipherFactory, CipherMode, RestoreOutcome, SessionCipher};

const IO_CHUNK: usize = 64 * 1024;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealkit",
    version,
    about = "Seal transient session state with a per-session key",
    long_about = "sealkit: encrypt session state with a lazily generated AES-128 key that lives in a restorable bundle"
)]
struct Cli {
    /// Path to sealkit.toml configuration file
    #[arg(long, short = 'c', env = "SEALKIT_CONFIG", default_value = "sealkit.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "SEALKIT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "SEALKIT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file with the session key
    ///
    /// Reuses the key from the bundle when one exists, otherwise generates a
    /// new key and stores it in the bundle.
    Seal {
        input: PathBuf,
        output: PathBuf,
        /// Bundle file (overrides config)
        #[arg(long, short = 'b', env = "SEALKIT_BUNDLE")]
        bundle: Option<PathBuf>,
    },

    /// Decrypt a file sealed in the current session
    Unseal {
        input: PathBuf,
        output: PathBuf,
        /// Bundle file (overrides config)
        #[arg(long, short = 'b', env = "SEALKIT_BUNDLE")]
        bundle: Option<PathBuf>,
    },

    /// Show whether the bundle holds a session key
    Inspect {
        /// Bundle file (overrides config)
        #[arg(long, short = 'b', env = "SEALKIT_BUNDLE")]
        bundle: Option<PathBuf>,
    },

    /// Delete the bundle, ending the session
    Forget {
        /// Bundle file (overrides config)
        #[arg(long, short = 'b', env = "SEALKIT_BUNDLE")]
        bundle: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SealkitConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "sealkit starting"
    );

    match cli.command {
        Commands::Seal { input, output, bundle } => {
            cmd_seal(&config, &input, &output, bundle.as_deref())
        }
        Commands::Unseal { input, output, bundle } => {
            cmd_unseal(&config, &input, &output, bundle.as_deref())
        }
        Commands::Inspect { bundle } => cmd_inspect(&config, bundle.as_deref()),
        Commands::Forget { bundle } => cmd_forget(&config, bundle.as_deref()),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

fn bundle_file(config: &SealkitConfig, override_path: Option<&Path>) -> BundleFile {
    BundleFile::new(override_path.unwrap_or(config.bundle.path.as_path()))
}

/// Build the factory and adopt the saved session, if any.
///
/// Restore runs before any generation is triggered so a saved key always
/// wins over a freshly generated one.
fn open_session(
    config: &SealkitConfig,
    file: &BundleFile,
) -> Result<(CipherFactory, Option<MemoryBundle>, RestoreOutcome)> {
    let factory = CipherFactory::from_config(&config.crypto);
    let saved = file
        .load()
        .with_context(|| format!("reading bundle: {}", file.path().display()))?;
    let outcome = factory.restore_from_bundle(saved.as_ref());
    tracing::debug!(?outcome, bundle = %file.path().display(), "session restore");
    Ok((factory, saved, outcome))
}

// ── `sealkit seal` ────────────────────────────────────────────────────────────

fn cmd_seal(
    config: &SealkitConfig,
    input: &Path,
    output: &Path,
    bundle_override: Option<&Path>,
) -> Result<()> {
    let file = bundle_file(config, bundle_override);
    let (factory, saved, outcome) = open_session(config, &file)?;

    if !outcome.is_success() {
        // overlap key generation with opening the input
        factory.start_eager(&config.crypto);
    }

    let reader = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let cipher = factory
        .get_cipher(CipherMode::Encrypt)
        .context("no cipher available: key generation failed")?;
    let written = stream_file(cipher, reader, output)?;

    let mut bundle = saved.unwrap_or_default();
    if factory.save_to_bundle(&mut bundle) {
        file.save(&bundle)
            .with_context(|| format!("writing bundle: {}", file.path().display()))?;
    }

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = written,
        "sealed"
    );
    println!("sealed {} -> {} ({written} bytes)", input.display(), output.display());
    Ok(())
}

// ── `sealkit unseal` ──────────────────────────────────────────────────────────

fn cmd_unseal(
    config: &SealkitConfig,
    input: &Path,
    output: &Path,
    bundle_override: Option<&Path>,
) -> Result<()> {
    let file = bundle_file(config, bundle_override);
    let (factory, saved, outcome) = open_session(config, &file)?;

    if saved.is_none() {
        anyhow::bail!(
            "no saved session at {}\n\
             The session was ended (or never started); data sealed in it cannot be recovered.",
            file.path().display()
        );
    }
    if !outcome.is_success() {
        anyhow::bail!(
            "bundle {} does not hold a usable session key",
            file.path().display()
        );
    }

    let reader = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let cipher = factory
        .get_cipher(CipherMode::Decrypt)
        .context("no cipher available")?;
    let written = stream_file(cipher, reader, output)
        .with_context(|| format!("unsealing {}", input.display()))?;

    println!("unsealed {} -> {} ({written} bytes)", input.display(), output.display());
    Ok(())
}

/// Pump `reader` through `cipher` into `output` in fixed-size chunks.
///
/// Output goes to a sibling temp file that is renamed into place only once
/// the cipher has finalized; on any failure `output` is left untouched.
fn stream_file(cipher: SessionCipher, reader: File, output: &Path) -> Result<u64> {
    let tmp = output.with_extension("sealkit_tmp");
    let result = pump(cipher, reader, &tmp).and_then(|written| {
        std::fs::rename(&tmp, output)
            .with_context(|| format!("renaming to: {}", output.display()))?;
        Ok(written)
    });

    if result.is_err() {
        if let Err(e) = std::fs::remove_file(&tmp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(tmp = %tmp.display(), error = %e, "could not remove partial output");
            }
        }
    }
    result
}

fn pump(mut cipher: SessionCipher, reader: File, tmp: &Path) -> Result<u64> {
    let mut reader = BufReader::new(reader);
    let out = File::create(tmp).with_context(|| format!("writing tmp: {}", tmp.display()))?;
    let mut writer = BufWriter::new(out);

    let mut buf = vec![0u8; IO_CHUNK];
    let mut written = 0u64;
    loop {
        let n = reader.read(&mut buf).context("reading input")?;
        if n == 0 {
            break;
        }
        let chunk = cipher.update(&buf[..n]);
        writer.write_all(&chunk).context("writing output")?;
        written += chunk.len() as u64;
    }
    let tail = cipher.finalize()?;
    writer.write_all(&tail).context("writing output")?;
    writer.flush().context("flushing output")?;
    drop(writer);
    written += tail.len() as u64;

    Ok(written)
}

// ── `sealkit inspect` ─────────────────────────────────────────────────────────

fn cmd_inspect(config: &SealkitConfig, bundle_override: Option<&Path>) -> Result<()> {
    let file = bundle_file(config, bundle_override);
    let (factory, saved, outcome) = open_session(config, &file)?;

    let Some(saved) = saved else {
        println!("bundle: {} (absent)", file.path().display());
        return Ok(());
    };

    println!("bundle:  {}", file.path().display());
    println!("entries: {}", saved.len());
    for key in saved.keys() {
        println!("  {key}");
    }
    match factory.material() {
        Some(material) if outcome.is_success() => {
            println!("session key: present (fingerprint {})", material.fingerprint());
        }
        _ => println!("session key: absent or malformed"),
    }
    Ok(())
}

// ── `sealkit forget` ──────────────────────────────────────────────────────────

fn cmd_forget(config: &SealkitConfig, bundle_override: Option<&Path>) -> Result<()> {
    let file = bundle_file(config, bundle_override);
    let removed = file
        .remove()
        .with_context(|| format!("removing bundle: {}", file.path().display()))?;

    if removed {
        tracing::info!(bundle = %file.path().display(), "session ended");
        println!("removed {}; data sealed in this session is now unreadable", file.path().display());
    } else {
        println!("no bundle at {}", file.path().display());
    }
    Ok(())
}

// ── `sealkit config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &SealkitConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = config.to_toml_string().context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
