//! Durable factor-model layout.
//!
//! There is no serialization of the factor matrices into the descriptor
//! itself. Instead the descriptor records pointers to two shard files, one
//! per side, each a gzip-compressed stream of newline-delimited
//! `[id, vector]` JSON records. The descriptor is self-contained: a model
//! can be re-loaded using only the paths recorded in it.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::types::{FactorModel, HyperParams};

/// Descriptor file name inside a model directory.
pub const DESCRIPTOR_FILE: &str = "model.json";

const X_SHARD: &str = "X.json.gz";
const Y_SHARD: &str = "Y.json.gz";

/// Self-contained metadata for a persisted factor model.
///
/// The serialized field names (`X`, `Y`, `features`, `regularization`,
/// `implicit`, `alpha`, `XIDs`, `YIDs`) are a stable contract with
/// downstream consumers; shard paths are relative to the descriptor's
/// directory, and the id lists are parallel to shard contents for quick
/// inspection without a full decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(rename = "X")]
    pub x_path: String,
    #[serde(rename = "Y")]
    pub y_path: String,
    pub features: usize,
    pub regularization: f64,
    pub implicit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(rename = "XIDs")]
    pub x_ids: Vec<i32>,
    #[serde(rename = "YIDs")]
    pub y_ids: Vec<i32>,
    pub created_at: DateTime<Utc>,
}

/// Persist a factor model under `dir`: both shards first, the descriptor
/// last, so a readable descriptor implies complete shards.
pub fn encode_model(
    model: &FactorModel,
    params: &HyperParams,
    implicit: bool,
    dir: &Path,
) -> Result<ModelDescriptor> {
    fs::create_dir_all(dir)?;

    let x_ids = write_shard(&model.user_factors, &dir.join(X_SHARD))?;
    let y_ids = write_shard(&model.item_factors, &dir.join(Y_SHARD))?;

    let descriptor = ModelDescriptor {
        x_path: X_SHARD.to_string(),
        y_path: Y_SHARD.to_string(),
        features: model.rank,
        regularization: params.regularization,
        implicit,
        alpha: implicit.then_some(params.alpha),
        x_ids,
        y_ids,
        created_at: Utc::now(),
    };

    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    let file = File::create(&descriptor_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &descriptor)?;
    info!(path = %descriptor_path.display(), "Persisted model descriptor");

    Ok(descriptor)
}

/// Read the descriptor from a model directory.
pub fn read_descriptor(dir: &Path) -> Result<ModelDescriptor> {
    let path = dir.join(DESCRIPTOR_FILE);
    let file = File::open(&path).map_err(|e| {
        PipelineError::CorruptModel(format!("missing descriptor at {}: {e}", path.display()))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        PipelineError::CorruptModel(format!("undecodable descriptor at {}: {e}", path.display()))
    })
}

/// Stream both factor shards back into a typed model.
///
/// Fails with [`PipelineError::CorruptModel`] if a shard is missing, a
/// record does not decode to `(id, vector)`, vectors are not of the
/// declared uniform length, an id repeats, or shard contents disagree with
/// the descriptor's id lists.
pub fn decode_model(descriptor: &ModelDescriptor, dir: &Path) -> Result<FactorModel> {
    let user_factors = read_shard(&dir.join(&descriptor.x_path), descriptor.features)?;
    let item_factors = read_shard(&dir.join(&descriptor.y_path), descriptor.features)?;

    check_ids("X", &user_factors, &descriptor.x_ids)?;
    check_ids("Y", &item_factors, &descriptor.y_ids)?;

    Ok(FactorModel {
        rank: descriptor.features,
        user_factors,
        item_factors,
    })
}

fn write_shard(factors: &HashMap<i32, Vec<f64>>, path: &Path) -> Result<Vec<i32>> {
    let mut ids: Vec<i32> = factors.keys().copied().collect();
    ids.sort_unstable();

    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    for id in &ids {
        let line = serde_json::to_string(&(id, &factors[id]))?;
        writeln!(encoder, "{line}")?;
    }
    encoder.finish()?.flush()?;

    info!(path = %path.display(), entries = ids.len(), "Saved factor shard");
    Ok(ids)
}

fn read_shard(path: &Path, rank: usize) -> Result<HashMap<i32, Vec<f64>>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::CorruptModel(format!("missing factor shard at {}: {e}", path.display()))
    })?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut factors = HashMap::new();
    for line in reader.lines() {
        let line = line.map_err(|e| {
            PipelineError::CorruptModel(format!("unreadable shard {}: {e}", path.display()))
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let (id, vector): (i32, Vec<f64>) = serde_json::from_str(&line).map_err(|_| {
            PipelineError::CorruptModel(format!(
                "shard record {line:?} in {} does not decode to (id, vector)",
                path.display()
            ))
        })?;
        if vector.len() != rank {
            return Err(PipelineError::CorruptModel(format!(
                "vector for id {id} in {} has length {}, expected {rank}",
                path.display(),
                vector.len()
            )));
        }
        if factors.insert(id, vector).is_some() {
            return Err(PipelineError::CorruptModel(format!(
                "duplicate id {id} in {}",
                path.display()
            )));
        }
    }

    info!(path = %path.display(), entries = factors.len(), "Loaded factor shard");
    Ok(factors)
}

fn check_ids(side: &str, factors: &HashMap<i32, Vec<f64>>, expected: &[i32]) -> Result<()> {
    if factors.len() != expected.len() || !expected.iter().all(|id| factors.contains_key(id)) {
        return Err(PipelineError::CorruptModel(format!(
            "{side} shard ids disagree with descriptor {side}IDs"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> FactorModel {
        let mut user_factors = HashMap::new();
        user_factors.insert(1, vec![0.5, -1.25]);
        user_factors.insert(2, vec![2.0, 0.0]);
        let mut item_factors = HashMap::new();
        item_factors.insert(10, vec![1.0, 1.0]);
        item_factors.insert(20, vec![-0.75, 3.5]);
        item_factors.insert(30, vec![0.0, 0.25]);

        FactorModel {
            rank: 2,
            user_factors,
            item_factors,
        }
    }

    fn params() -> HyperParams {
        HyperParams::new(2, 0.01, 40.0)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = sample_model();

        let descriptor = encode_model(&model, &params(), true, dir.path()).unwrap();
        assert_eq!(descriptor.x_ids, vec![1, 2]);
        assert_eq!(descriptor.y_ids, vec![10, 20, 30]);
        assert_eq!(descriptor.alpha, Some(40.0));

        let reread = read_descriptor(dir.path()).unwrap();
        assert_eq!(reread, descriptor);

        let decoded = decode_model(&reread, dir.path()).unwrap();
        assert_eq!(decoded.rank, model.rank);
        assert_eq!(
            decoded.user_factors.keys().collect::<std::collections::HashSet<_>>(),
            model.user_factors.keys().collect()
        );
        assert_eq!(
            decoded.item_factors.keys().collect::<std::collections::HashSet<_>>(),
            model.item_factors.keys().collect()
        );
        for (id, vector) in &model.user_factors {
            for (a, b) in vector.iter().zip(&decoded.user_factors[id]) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_alpha_absent_in_explicit_mode() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = encode_model(&sample_model(), &params(), false, dir.path()).unwrap();
        assert_eq!(descriptor.alpha, None);

        let json = std::fs::read_to_string(dir.path().join(DESCRIPTOR_FILE)).unwrap();
        assert!(!json.contains("alpha"));
        assert!(json.contains("\"X\""));
        assert!(json.contains("\"XIDs\""));
    }

    #[test]
    fn test_missing_shard_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = encode_model(&sample_model(), &params(), false, dir.path()).unwrap();

        std::fs::remove_file(dir.path().join(X_SHARD)).unwrap();
        assert!(matches!(
            decode_model(&descriptor, dir.path()),
            Err(PipelineError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_ragged_shard_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = encode_model(&sample_model(), &params(), false, dir.path()).unwrap();

        // rewrite the Y shard with one short vector
        let file = File::create(dir.path().join(Y_SHARD)).unwrap();
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        writeln!(encoder, "[10,[1.0,1.0]]").unwrap();
        writeln!(encoder, "[20,[0.5]]").unwrap();
        encoder.finish().unwrap();

        assert!(matches!(
            decode_model(&descriptor, dir.path()),
            Err(PipelineError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_undecodable_record_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = encode_model(&sample_model(), &params(), false, dir.path()).unwrap();

        let file = File::create(dir.path().join(Y_SHARD)).unwrap();
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        writeln!(encoder, "not json at all").unwrap();
        encoder.finish().unwrap();

        assert!(matches!(
            decode_model(&descriptor, dir.path()),
            Err(PipelineError::CorruptModel(_))
        ));
    }

    #[test]
    fn test_id_list_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = encode_model(&sample_model(), &params(), false, dir.path()).unwrap();

        descriptor.x_ids.push(999);
        assert!(matches!(
            decode_model(&descriptor, dir.path()),
            Err(PipelineError::CorruptModel(_))
        ));
    }
}
