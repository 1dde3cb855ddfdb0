//! CUSTODIA — Audit Chain Demo CLI
//!
//! Exercises the full audit flow against a SQLite database: append a batch
//! of clinical events, verify the chain, tamper with a committed row the
//! way an attacker with database access would, and watch verification
//! pinpoint the break.
//!
//! Usage:
//!   cargo run -p demo -- seed
//!   cargo run -p demo -- verify
//!   cargo run -p demo -- tamper --id 2
//!   cargo run -p demo -- status

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use custodia_audit::{AuditConfig, AuditLog};
use custodia_contracts::{
    error::{CustodiaError, CustodiaResult},
    event::AuditEvent,
    verify::ChainReport,
};
use custodia_core::AuditStore;
use custodia_store::SqliteAuditStore;

// ── CLI definition ────────────────────────────────────────────────────────────

/// CUSTODIA — tamper-evident audit log demo.
///
/// Every subcommand operates on the SQLite database named in the config
/// (default `custodia.db` in the working directory).
#[derive(Parser)]
#[command(
    name = "demo",
    about = "CUSTODIA audit chain demo",
    long_about = "Appends hash-chained audit entries to a SQLite store, verifies the\n\
                  chain by replay, and demonstrates detection of out-of-band edits."
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append a batch of sample clinical audit events.
    Seed,
    /// Replay the chain and report the first divergence, if any.
    Verify {
        /// Maximum entries to examine (config default when omitted).
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Rewrite a committed row's action directly in SQLite, bypassing the
    /// audit API, then re-verify to show detection.
    Tamper {
        /// The entry id to corrupt.
        #[arg(long, default_value_t = 2)]
        id: u64,
    },
    /// Show entry count, chain tip, and retention policy.
    Status,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = (|| -> CustodiaResult<()> {
        let config = match &cli.config {
            Some(path) => AuditConfig::from_file(path)?,
            None => AuditConfig::default(),
        };

        match cli.command {
            Command::Seed => seed(&config),
            Command::Verify { limit } => verify(&config, limit),
            Command::Tamper { id } => tamper(&config, id),
            Command::Status => status(&config),
        }
    })();

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn open_log(config: &AuditConfig) -> CustodiaResult<AuditLog<SqliteAuditStore>> {
    let store = SqliteAuditStore::open(&config.store.path)?;
    Ok(AuditLog::from_config(store, config))
}

/// Append a small batch of events shaped like real clinical traffic.
fn seed(config: &AuditConfig) -> CustodiaResult<()> {
    let log = open_log(config)?;

    let events = vec![
        AuditEvent::new("VIEW_PATIENT")
            .user_id("dr-osei")
            .user_role("doctor")
            .resource_type("patient")
            .resource_id("p-4711")
            .ip_address("10.20.0.7")
            .request_detail("reason", "treatment_planning")
            .response_status(200)
            .phi_accessed(true),
        AuditEvent::new("SEARCH_PAPERS")
            .user_id("res-ives")
            .user_role("researcher")
            .request_detail("query", "beta blocker outcomes")
            .response_status(200),
        AuditEvent::new("PARSE_HL7_ADT")
            .user_id("svc-mirth")
            .user_role("integration")
            .resource_type("hl7_message")
            .resource_id("MSG00001")
            .response_status(200),
        AuditEvent::new("EXPORT_EHR")
            .user_id("dr-osei")
            .user_role("doctor")
            .resource_type("patient")
            .resource_id("p-4711")
            .request_detail("format", "fhir")
            .response_status(200)
            .phi_accessed(true),
    ];

    for event in events {
        let action = event.action.clone();
        let id = log.log(event)?;
        println!("  committed #{:<3} {}", id, action);
    }

    println!();
    println!(
        "Seeded. Chain tip: {}",
        log.store().tip_hash()?.unwrap_or_default()
    );
    Ok(())
}

fn verify(config: &AuditConfig, limit: Option<u64>) -> CustodiaResult<()> {
    let log = open_log(config)?;
    let limit = limit.unwrap_or(config.verify.default_limit);

    let report = log.verify(limit)?;
    print_report(&report);
    Ok(())
}

fn tamper(config: &AuditConfig, id: u64) -> CustodiaResult<()> {
    let log = open_log(config)?;

    println!("Before tampering:");
    print_report(&log.verify(config.verify.default_limit)?);
    println!();

    // Edit the database out-of-band, exactly as an attacker with file
    // access would. The audit API itself has no mutation path.
    let conn = rusqlite::Connection::open(&config.store.path).map_err(|e| {
        CustodiaError::Storage {
            reason: e.to_string(),
        }
    })?;
    let changed = conn
        .execute(
            "UPDATE audit_entries SET action = 'HIDDEN' WHERE id = ?1",
            rusqlite::params![id as i64],
        )
        .map_err(|e| CustodiaError::Storage {
            reason: e.to_string(),
        })?;
    if changed == 0 {
        return Err(CustodiaError::Validation {
            reason: format!("no entry with id {}", id),
        });
    }
    println!("Rewrote entry #{} via raw SQL.", id);
    println!();

    println!("After tampering:");
    print_report(&log.verify(config.verify.default_limit)?);
    Ok(())
}

fn status(config: &AuditConfig) -> CustodiaResult<()> {
    let store = SqliteAuditStore::open(&config.store.path)?;

    let location = store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in memory)".to_string());
    println!("Store:     {}", location);
    println!("Entries:   {}", store.entry_count()?);
    println!(
        "Chain tip: {}",
        store.tip_hash()?.unwrap_or_else(|| "(empty)".to_string())
    );
    println!("Retention: {} years (archival must anchor a checkpoint)", config.retention.years);
    Ok(())
}

fn print_report(report: &ChainReport) {
    match &report.first_invalid {
        None => println!(
            "chain OK — {} entries verified, checkpoint at #{}",
            report.entries_checked,
            report
                .checkpoint
                .as_ref()
                .map(|c| c.id.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        Some(violation) => println!(
            "chain BROKEN at entry #{} ({:?}) — {} entries examined",
            violation.id, violation.kind, report.entries_checked
        ),
    }
}
