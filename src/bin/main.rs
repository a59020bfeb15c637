// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use clap::Parser;
use csv::Writer;
use ledger_effects_rs::{Effect, EffectStore, IngestConfig, Ingester, Ledger, MemoryStore};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Ledger Effects - Derive effects from a ledger history file
///
/// Reads closed ledgers from a JSON file, ingests them in sequence order and
/// writes every resulting effect to stdout as CSV.
#[derive(Parser, Debug)]
#[command(name = "ledger-effects")]
#[command(about = "Derives effect records from closed ledgers", long_about = None)]
struct Args {
    /// Path to a JSON array of ledgers
    ///
    /// Example: cargo run -- ledgers.json > effects.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Threads used to resolve a single ledger
    #[arg(long, default_value_t = IngestConfig::default().workers)]
    workers: usize,

    /// Minimum transactions in a ledger before resolution goes parallel
    #[arg(long, default_value_t = IngestConfig::default().parallel_threshold)]
    parallel_threshold: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = IngestConfig {
        workers: args.workers,
        parallel_threshold: args.parallel_threshold,
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open ledger file");
            process::exit(1);
        }
    };

    let ingester = match ingest_ledgers(BufReader::new(file), config) {
        Ok(ingester) => ingester,
        Err(e) => {
            error!(error = %e, "ingestion failed");
            process::exit(1);
        }
    };

    if let Err(e) = write_effects(ingester.store(), std::io::stdout()) {
        error!(error = %e, "cannot write effects");
        process::exit(1);
    }
}

/// Reads a JSON array of ledgers and ingests them in ascending sequence order.
///
/// Ledgers may appear in any order in the file. A ledger listed twice is
/// ingested twice, the second pass replacing the first.
///
/// # Errors
///
/// Returns the first parse or ingestion error; ledgers before it stay committed.
pub fn ingest_ledgers<R: Read>(
    reader: R,
    config: IngestConfig,
) -> Result<Ingester<MemoryStore>, Box<dyn std::error::Error>> {
    let mut ledgers: Vec<Ledger> = serde_json::from_reader(reader)?;
    ledgers.sort_by_key(|ledger| ledger.sequence);

    let ingester = Ingester::with_config(MemoryStore::new(), config);
    for ledger in &ledgers {
        ingester.ingest(ledger)?;
    }
    Ok(ingester)
}

/// CSV row for one effect. `details` holds the detail map as compact JSON.
#[derive(Debug, Serialize)]
struct EffectRow<'a> {
    id: u64,
    operation_id: u64,
    account: &'a str,
    #[serde(rename = "type")]
    effect_type: &'static str,
    details: String,
}

impl<'a> EffectRow<'a> {
    fn new(effect: &'a Effect) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: effect.id.0,
            operation_id: effect.operation_id.0,
            account: effect.account.as_str(),
            effect_type: effect.effect_type.as_str(),
            details: serde_json::to_string(&effect.details)?,
        })
    }
}

/// Writes every stored effect as CSV, ordered by identifier.
///
/// # CSV Format
///
/// Columns: `id, operation_id, account, type, details`
///
/// ```csv
/// id,operation_id,account,type,details
/// 30065827841,30065827840,GALICE,account_debited,"{""amount"":""12.5000000"",""asset_type"":""native""}"
/// ```
pub fn write_effects<W: Write>(
    store: &MemoryStore,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = Writer::from_writer(writer);

    for ledger in store.ledgers() {
        for effect in store.effects_for_ledger(ledger)? {
            wtr.serialize(EffectRow::new(&effect)?)?;
        }
    }

    wtr.flush()?;
    Ok(())
}
