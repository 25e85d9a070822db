//! Sample identity reconciliation: id remapping and cohort subsetting.
//!
//! Id tables are small tab-separated files with a header row. Remap tables carry
//! `s` (callset id) and `seqr_id` (target id); subset tables carry `s`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{DataFrameEngine, EngineError, TableHandle};

pub const SOURCE_ID_COLUMN: &str = "s";
pub const TARGET_ID_COLUMN: &str = "seqr_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdTableKind {
    Remap,
    Subset,
}

impl fmt::Display for IdTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remap => f.write_str("remap"),
            Self::Subset => f.write_str("subsetting-table"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SampleSetError {
    #[error(
        "Duplicate s or seqr_id entries in remap file were found. Duplicate s:{source_duplicates:?}. \
         Duplicate seqr_id:{target_duplicates:?}."
    )]
    DuplicateRemapIds {
        source_duplicates: Vec<String>,
        target_duplicates: Vec<String>,
    },

    #[error(
        "Only {matched} out of {total} {table} IDs matched IDs in the variant callset.\n\
         IDs that aren't in the callset: {missing:?}\n\
         All callset sample IDs:{callset_ids:?}"
    )]
    MissingSamples {
        table: IdTableKind,
        matched: usize,
        total: usize,
        missing: Vec<String>,
        callset_ids: Vec<String>,
    },

    #[error("Column {column} missing from {path}")]
    MissingColumn { path: String, column: String },

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for SampleSetError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::MissingColumn { path, column } => Self::MissingColumn { path, column },
            other => Self::Engine(other),
        }
    }
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut counts: BTreeMap<&String, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Validate remap rows against the callset and build the id mapping.
///
/// Duplicates on either side are fatal, as is any source id absent from the callset.
pub fn check_remap(
    rows: &[(String, String)],
    callset_ids: &[String],
) -> Result<BTreeMap<String, String>, SampleSetError> {
    let source_duplicates = duplicates(rows.iter().map(|(s, _)| s));
    let target_duplicates = duplicates(rows.iter().map(|(_, t)| t));
    if !source_duplicates.is_empty() || !target_duplicates.is_empty() {
        return Err(SampleSetError::DuplicateRemapIds {
            source_duplicates,
            target_duplicates,
        });
    }

    let present: BTreeSet<&String> = callset_ids.iter().collect();
    let missing: Vec<String> = rows
        .iter()
        .map(|(s, _)| s)
        .filter(|s| !present.contains(s))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SampleSetError::MissingSamples {
            table: IdTableKind::Remap,
            matched: rows.len() - missing.len(),
            total: rows.len(),
            missing,
            callset_ids: callset_ids.to_vec(),
        });
    }

    Ok(rows.iter().cloned().collect())
}

/// Validate subset ids against the callset and return the ids to keep.
///
/// With `ignore_missing`, absent ids are tolerated only while at least one id matches.
pub fn check_subset(
    ids: &[String],
    callset_ids: &[String],
    ignore_missing: bool,
) -> Result<Vec<String>, SampleSetError> {
    let wanted: BTreeSet<&String> = ids.iter().collect();
    let present: BTreeSet<&String> = callset_ids.iter().collect();
    let missing: Vec<String> = wanted.difference(&present).map(|s| s.to_string()).collect();
    let total = wanted.len();
    let matched = total - missing.len();

    if !missing.is_empty() {
        let err = SampleSetError::MissingSamples {
            table: IdTableKind::Subset,
            matched,
            total,
            missing,
            callset_ids: callset_ids.to_vec(),
        };
        if ignore_missing && matched > 0 {
            warn!("{}", err);
        } else {
            return Err(err);
        }
    }

    Ok(callset_ids
        .iter()
        .filter(|s| wanted.contains(s))
        .cloned()
        .collect())
}

pub async fn remap_sample_ids(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    remap_path: &str,
) -> Result<TableHandle, SampleSetError> {
    let rows: Vec<(String, String)> = engine
        .read_id_table(remap_path, &[SOURCE_ID_COLUMN, TARGET_ID_COLUMN])
        .await?
        .into_iter()
        .filter_map(|row| match row.as_slice() {
            [s, seqr_id] => Some((s.clone(), seqr_id.clone())),
            _ => None,
        })
        .collect();
    let callset_ids = engine.sample_ids(table).await?;
    let mapping = check_remap(&rows, &callset_ids)?;

    let remapped = engine.remap_samples(table, &mapping).await?;
    info!("Remapped {} sample ids...", mapping.len());
    Ok(remapped)
}

/// Restrict to the listed samples, then drop rows without a non-reference call.
pub async fn subset_samples(
    engine: &dyn DataFrameEngine,
    table: &TableHandle,
    subset_path: &str,
    ignore_missing: bool,
) -> Result<TableHandle, SampleSetError> {
    let ids: Vec<String> = engine
        .read_id_table(subset_path, &[SOURCE_ID_COLUMN])
        .await?
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect();
    let callset_ids = engine.sample_ids(table).await?;
    let keep = check_subset(&ids, &callset_ids, ignore_missing)?;

    let subset = engine.subset_samples(table, &keep).await?;
    let subset = engine.filter_rows_with_non_ref_calls(&subset).await?;
    info!(
        "Finished subsetting samples. Kept {} out of {} samples",
        keep.len(),
        callset_ids.len()
    );
    Ok(subset)
}
