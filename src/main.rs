//! Binary entry point for scrubgate.
//!
//! This binary provides the CLI interface to the privacy gateway pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{CommandFactory, Parser, Subcommand};
use rand::Rng;
use scrubgate::audit::{AuditSink, AuditStore};
use scrubgate::config::ScrubgateConfig;
use scrubgate::observability::{self, InitOptions};
use scrubgate::security::{KeyMaterial, MessageCipher, MessageRedactor};
use scrubgate::{CircuitBreaker, Error, InquiryPipeline, InquiryRequest, SimulatedAssistant};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Scrubgate - privacy gateway for AI assistant inquiries.
#[derive(Parser)]
#[command(name = "scrubgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Process an inquiry through the privacy pipeline.
    Inquire {
        /// The inquiring user's id.
        user_id: String,

        /// The free-text message.
        message: String,

        /// Force the downstream call to fail (resilience testing).
        #[arg(long)]
        fail_downstream: bool,
    },

    /// Redact a message without processing it.
    Redact {
        /// The text to redact.
        text: String,
    },

    /// Audit trail maintenance.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Generate a fresh base64-encoded 256-bit encryption key.
    Keygen,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Audit subcommands.
#[derive(Subcommand)]
enum AuditCommands {
    /// List recent audit records (most recent last).
    List {
        /// Maximum number of records to show.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Verify the audit trail: HMAC chain integrity and envelope
    /// authentication against the process key.
    Verify,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match ScrubgateConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Dispatches the parsed command.
async fn run_command(cli: Cli, config: ScrubgateConfig) -> scrubgate::Result<()> {
    match cli.command {
        Commands::Inquire {
            user_id,
            message,
            fail_downstream,
        } => run_inquire(&config, user_id, message, fail_downstream).await,
        Commands::Redact { text } => {
            println!("{}", MessageRedactor::new().redact(&text));
            Ok(())
        },
        Commands::Audit { command } => match command {
            AuditCommands::List { limit } => run_audit_list(&config, limit),
            AuditCommands::Verify => run_audit_verify(&config),
        },
        Commands::Keygen => {
            use base64::Engine;
            let mut key = [0u8; 32];
            rand::rng().fill_bytes(&mut key);
            println!(
                "{}",
                base64::engine::general_purpose::STANDARD.encode(key)
            );
            Ok(())
        },
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "scrubgate",
                &mut std::io::stdout(),
            );
            Ok(())
        },
    }
}

/// Runs one inquiry through the pipeline and prints the structured response.
async fn run_inquire(
    config: &ScrubgateConfig,
    user_id: String,
    message: String,
    fail_downstream: bool,
) -> scrubgate::Result<()> {
    // Key absence or malformation is startup-fatal: refuse to serve.
    let key = KeyMaterial::from_env()?;
    let cipher = MessageCipher::new(&key);

    let mut store = AuditStore::new(&config.audit.store_path);
    if let Some(ref hmac_key) = config.audit.hmac_key {
        store = store.with_hmac_key(hmac_key.clone());
    }
    let sink = AuditSink::spawn(store);

    let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
    let client = SimulatedAssistant::new(config.downstream.latency());
    let pipeline = InquiryPipeline::new(cipher, breaker, sink, client);

    let response = pipeline
        .handle(InquiryRequest {
            user_id,
            message,
            force_downstream_failure: fail_downstream,
        })
        .await?;

    let json = serde_json::to_string_pretty(&response).map_err(|e| Error::OperationFailed {
        operation: "render_response".to_string(),
        cause: e.to_string(),
    })?;
    println!("{json}");
    Ok(())
}

/// Lists recent audit records without touching envelope contents.
fn run_audit_list(config: &ScrubgateConfig, limit: usize) -> scrubgate::Result<()> {
    let store = AuditStore::new(&config.audit.store_path);
    let records = store.load();

    let start = records.len().saturating_sub(limit);
    for record in &records[start..] {
        println!(
            "{}  {}  user={}  outcome={}  breaker={}",
            record.created_at.to_rfc3339(),
            record.id,
            record.user_id,
            record.outcome.as_str(),
            record.breaker_phase_at_write.as_str(),
        );
    }
    println!("{} of {} records", records.len() - start, records.len());
    Ok(())
}

/// Verifies chain integrity and decrypts every envelope with the process key.
fn run_audit_verify(config: &ScrubgateConfig) -> scrubgate::Result<()> {
    let key = KeyMaterial::from_env()?;
    let cipher = MessageCipher::new(&key);

    let mut store = AuditStore::new(&config.audit.store_path);
    if let Some(ref hmac_key) = config.audit.hmac_key {
        store = store.with_hmac_key(hmac_key.clone());
    }

    if store.is_signing_enabled() {
        store.verify_chain()?;
        println!("HMAC chain: ok");
    } else {
        println!("HMAC chain: skipped (no key configured)");
    }

    let records = store.load();
    let mut failed = 0usize;
    for record in &records {
        match cipher.decrypt(&record.encrypted_original) {
            Ok(_) => {},
            Err(Error::Authentication(_)) => {
                failed += 1;
                eprintln!("record {} failed envelope authentication", record.id);
            },
            Err(e) => return Err(e),
        }
    }

    println!(
        "envelopes: {} ok, {failed} failed of {}",
        records.len() - failed,
        records.len()
    );

    if failed > 0 {
        return Err(Error::Authentication(format!(
            "{failed} audit envelope(s) failed authentication"
        )));
    }

    // Busy/error outcomes still carry sealed originals; nothing else to check.
    Ok(())
}
