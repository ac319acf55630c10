use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Largest batch the rewards API accepted in one request.
pub const MAX_RECORDS_PER_FILE: usize = 1900;

/// One item of a rewards batch, in the rewards API's own field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRecord {
    pub user_address: String,
    pub defi_id: u64,
    pub acs_amount: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountRule {
    PerUser(u64),
    /// Split a pool evenly, rounding down.
    Pool(u64),
}

impl AmountRule {
    pub fn per_user(&self, recipients: usize) -> AppResult<u64> {
        match *self {
            AmountRule::PerUser(amount) => Ok(amount),
            AmountRule::Pool(_) if recipients == 0 => Err(AppError::Configuration(
                "Cannot split a reward pool across zero recipients".to_string(),
            )),
            AmountRule::Pool(pool) => Ok(pool / recipients as u64),
        }
    }
}

pub fn build_records(
    addresses: &[String],
    defi_id: u64,
    amount: AmountRule,
    description: &str,
) -> AppResult<Vec<RewardRecord>> {
    let acs_amount = amount.per_user(addresses.len())?;
    info!(
        "Building {} reward records of {} each (defi id {})",
        addresses.len(),
        acs_amount,
        defi_id
    );

    Ok(addresses
        .iter()
        .map(|address| RewardRecord {
            user_address: address.clone(),
            defi_id,
            acs_amount,
            description: description.to_string(),
        })
        .collect())
}

/// `batch.json` -> `batch-3.json`
fn chunk_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    path.with_file_name(format!("{}-{}.{}", stem, index, extension))
}

/// Write pretty JSON. Batches above `max_per_file` are split into numbered files.
pub fn write_batches(path: &Path, records: &[RewardRecord], max_per_file: usize) -> AppResult<Vec<PathBuf>> {
    if max_per_file == 0 {
        return Err(AppError::Configuration("max records per file must be positive".to_string()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if records.len() <= max_per_file {
        write_json(path, records)?;
        return Ok(vec![path.to_path_buf()]);
    }

    let mut written = Vec::new();
    for (i, chunk) in records.chunks(max_per_file).enumerate() {
        let chunk_file = chunk_path(path, i + 1);
        write_json(&chunk_file, chunk)?;
        written.push(chunk_file);
    }
    info!("Split {} records into {} files", records.len(), written.len());
    Ok(written)
}

fn write_json(path: &Path, records: &[RewardRecord]) -> AppResult<()> {
    let mut file = File::create(path)?;
    let json = serde_json::to_string_pretty(records)?;
    file.write_all(json.as_bytes())?;
    info!("Wrote {} records to {:?}", records.len(), path);
    Ok(())
}

pub fn read_batch(path: &Path) -> AppResult<Vec<RewardRecord>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
