//! CSV checkpoint files.
//!
//! Layout: the first record holds a single field, the last processed block
//! (empty when none). Every following record is `address,balance` with the
//! balance in decimal wei, largest first. All fields are quoted.

use super::{Checkpoint, CheckpointStore};
use crate::ranking::Holder;
use alloy_primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CsvCheckpointStore {
    output: PathBuf,
}

impl CsvCheckpointStore {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.output.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CheckpointStore for CsvCheckpointStore {
    fn load(&self, path: &Path) -> Result<Checkpoint> {
        let file = File::open(path)
            .with_context(|| format!("failed to open checkpoint {}", path.display()))?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = csv_reader.records();
        let header = match records.next() {
            Some(record) => record.context("failed to read checkpoint header")?,
            None => bail!("checkpoint {} is empty", path.display()),
        };
        let last_processed_block = parse_block(header.get(0).unwrap_or_default())?;

        let mut holders = Vec::new();
        for (index, record) in records.enumerate() {
            let line = index + 2;
            let record = record.with_context(|| format!("failed to read checkpoint line {line}"))?;
            if record.len() != 2 {
                bail!(
                    "checkpoint line {line}: expected address,balance but found {} fields",
                    record.len()
                );
            }
            let address = Address::from_str(record[0].trim())
                .with_context(|| format!("checkpoint line {line}: invalid address"))?;
            let balance = U256::from_str_radix(record[1].trim(), 10)
                .with_context(|| format!("checkpoint line {line}: invalid balance"))?;
            holders.push(Holder::new(address, balance));
        }

        holders.sort_by(|a, b| b.cmp(a));
        Ok(Checkpoint::new(last_processed_block, holders))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let temp = self.temp_path();
        let file = File::create(&temp)
            .with_context(|| format!("failed to create {}", temp.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(BufWriter::new(file));

        let block = checkpoint
            .last_processed_block
            .map(|block| block.to_string())
            .unwrap_or_default();
        writer.write_record([block.as_str()])?;
        for holder in &checkpoint.holders {
            writer.write_record([holder.address.to_string(), holder.balance.to_string()])?;
        }

        let buffered = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to flush checkpoint: {}", err.error()))?;
        let file = buffered
            .into_inner()
            .map_err(|err| anyhow::anyhow!("failed to flush checkpoint: {}", err.error()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", temp.display()))?;
        drop(file);

        fs::rename(&temp, &self.output).with_context(|| {
            format!(
                "failed to move {} to {}",
                temp.display(),
                self.output.display()
            )
        })?;

        tracing::debug!(
            path = %self.output.display(),
            holders = checkpoint.holders.len(),
            last_processed_block = ?checkpoint.last_processed_block,
            "checkpoint saved"
        );
        Ok(())
    }
}

fn parse_block(field: &str) -> Result<Option<u64>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    let block = field
        .parse::<u64>()
        .with_context(|| format!("invalid last processed block {field:?}"))?;
    Ok(Some(block))
}
