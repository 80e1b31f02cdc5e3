//! On-disk classifier format: a `model.json` topology descriptor with a
//! weights manifest, plus binary shards of little-endian `f32` values
//! concatenated in manifest order.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path},
};

use super::network::{matches_architecture, Classifier, LayerSpec, ARCHITECTURE, INPUT_WIDTH};

pub const TOPOLOGY_FILE: &str = "model.json";
const FORMAT: &str = "layers-model";
const DTYPE: &str = "float32";
const SHARD_FILE: &str = "group1-shard1of1.bin";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub format: String,
    pub model_topology: Topology,
    pub weights_manifest: Vec<WeightGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub input_shape: Vec<usize>,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightGroup {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

/// Reads and validates a classifier from `dir`.
pub fn load_classifier(dir: &Path) -> Result<Classifier> {
    let topology_path = dir.join(TOPOLOGY_FILE);
    let contents = fs::read_to_string(&topology_path)
        .with_context(|| format!("failed to read {}", topology_path.display()))?;
    let descriptor: ArtifactDescriptor = serde_json::from_str(&contents)
        .with_context(|| format!("invalid descriptor {}", topology_path.display()))?;

    if descriptor.format != FORMAT {
        bail!("unsupported artifact format '{}'", descriptor.format);
    }
    if descriptor.model_topology.input_shape != [INPUT_WIDTH] {
        bail!(
            "input shape {:?} does not match [{INPUT_WIDTH}]",
            descriptor.model_topology.input_shape
        );
    }
    if !matches_architecture(&descriptor.model_topology.layers) {
        bail!("topology does not match the 21-64-32-16-3 classifier");
    }

    let mut tensors = Vec::new();
    for group in &descriptor.weights_manifest {
        let values = read_shards(dir, &group.paths)?;
        let mut offset = 0usize;
        for spec in &group.weights {
            if spec.dtype != DTYPE {
                bail!("weight '{}' has unsupported dtype {}", spec.name, spec.dtype);
            }
            let count: usize = spec.shape.iter().product();
            let slice = values.get(offset..offset + count).ok_or_else(|| {
                anyhow!(
                    "weight '{}' needs {count} values but the shards end at {}",
                    spec.name,
                    values.len()
                )
            })?;
            tensors.push((spec, slice.to_vec()));
            offset += count;
        }
        if offset != values.len() {
            bail!(
                "shards hold {} values but the manifest describes {offset}",
                values.len()
            );
        }
    }

    let mut pairs = Vec::new();
    let mut tensors = tensors.into_iter();
    while let Some((kernel_spec, kernel_values)) = tensors.next() {
        let (bias_spec, bias_values) = tensors
            .next()
            .ok_or_else(|| anyhow!("kernel '{}' has no bias", kernel_spec.name))?;

        let &[rows, cols] = kernel_spec.shape.as_slice() else {
            bail!("kernel '{}' must be rank 2", kernel_spec.name);
        };
        if bias_spec.shape.len() != 1 {
            bail!("bias '{}' must be rank 1", bias_spec.name);
        }

        let kernel = Array2::from_shape_vec((rows, cols), kernel_values)
            .with_context(|| format!("bad kernel '{}'", kernel_spec.name))?;
        pairs.push((kernel, Array1::from(bias_values)));
    }

    Classifier::from_dense(pairs).map_err(|err| anyhow!(err))
}

/// Writes `classifier` into `dir` in the format [`load_classifier`] reads.
pub fn save_classifier(classifier: &Classifier, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create model directory {}", dir.display()))?;

    let mut weights = Vec::new();
    let mut bytes = Vec::new();
    for (index, dense) in classifier.dense_layers().enumerate() {
        let name = format!("dense_{}", index + 1);
        let (rows, cols) = dense.kernel.dim();
        weights.push(WeightSpec {
            name: format!("{name}/kernel"),
            shape: vec![rows, cols],
            dtype: DTYPE.into(),
        });
        weights.push(WeightSpec {
            name: format!("{name}/bias"),
            shape: vec![dense.bias.len()],
            dtype: DTYPE.into(),
        });
        for value in dense.kernel.iter().chain(dense.bias.iter()) {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    let descriptor = ArtifactDescriptor {
        format: FORMAT.into(),
        model_topology: Topology {
            input_shape: vec![INPUT_WIDTH],
            layers: ARCHITECTURE.to_vec(),
        },
        weights_manifest: vec![WeightGroup {
            paths: vec![SHARD_FILE.into()],
            weights,
        }],
    };

    fs::write(dir.join(SHARD_FILE), bytes)
        .with_context(|| format!("failed to write weights into {}", dir.display()))?;
    fs::write(
        dir.join(TOPOLOGY_FILE),
        serde_json::to_string_pretty(&descriptor)?,
    )
    .with_context(|| format!("failed to write descriptor into {}", dir.display()))
}

fn read_shards(dir: &Path, paths: &[String]) -> Result<Vec<f32>> {
    let mut bytes = Vec::new();
    for path in paths {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            bail!("shard path '{path}' must stay inside the model directory");
        }
        let shard = dir.join(relative);
        bytes.extend(
            fs::read(&shard).with_context(|| format!("failed to read {}", shard.display()))?,
        );
    }

    if bytes.len() % 4 != 0 {
        bail!("weight data is {} bytes, not a whole number of f32", bytes.len());
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::network::CLASS_COUNT;
    use rand::{rngs::StdRng, SeedableRng};

    fn saved_model() -> (tempfile::TempDir, Classifier) {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Classifier::untrained(&mut StdRng::seed_from_u64(11));
        save_classifier(&classifier, dir.path()).unwrap();
        (dir, classifier)
    }

    #[test]
    fn saved_artifact_reproduces_predictions() {
        let (dir, original) = saved_model();
        let loaded = load_classifier(dir.path()).unwrap();

        let input = [0.25f32; INPUT_WIDTH];
        let expected = original.forward(&input);
        let actual = loaded.forward(&input);
        assert_eq!(actual.len(), CLASS_COUNT);
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_classifier(&dir.path().join("absent")).unwrap_err();
        assert!(format!("{err:#}").contains("model.json"));
    }

    #[test]
    fn truncated_shard_is_rejected() {
        let (dir, _) = saved_model();
        let shard = dir.path().join(SHARD_FILE);
        let mut bytes = fs::read(&shard).unwrap();
        bytes.truncate(bytes.len() - 8);
        fs::write(&shard, bytes).unwrap();

        assert!(load_classifier(dir.path()).is_err());
    }

    #[test]
    fn foreign_topology_is_rejected() {
        let (dir, _) = saved_model();
        let path = dir.path().join(TOPOLOGY_FILE);
        let mut descriptor: ArtifactDescriptor =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        descriptor.model_topology.layers.remove(1);
        fs::write(&path, serde_json::to_string(&descriptor).unwrap()).unwrap();

        let err = load_classifier(dir.path()).unwrap_err();
        assert!(err.to_string().contains("topology"));
    }

    #[test]
    fn escaping_shard_path_is_rejected() {
        let (dir, _) = saved_model();
        let path = dir.path().join(TOPOLOGY_FILE);
        let mut descriptor: ArtifactDescriptor =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        descriptor.weights_manifest[0].paths = vec!["../weights.bin".into()];
        fs::write(&path, serde_json::to_string(&descriptor).unwrap()).unwrap();

        assert!(load_classifier(dir.path()).is_err());
    }

    #[test]
    fn corrupt_descriptor_is_rejected() {
        let (dir, _) = saved_model();
        fs::write(dir.path().join(TOPOLOGY_FILE), "not json").unwrap();
        assert!(load_classifier(dir.path()).is_err());
    }
}
