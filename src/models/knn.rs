use std::path::Path;

use crate::error::RecognitionError;

/// 1-nearest-neighbour classifier over fixed-length feature vectors.
#[derive(Clone, Debug)]
pub struct NearestNeighbor {
    samples: Vec<(Vec<f32>, String)>,
    dim: usize,
}

impl NearestNeighbor {
    pub fn fit(samples: Vec<(Vec<f32>, String)>) -> Result<Self, RecognitionError> {
        let Some((first, _)) = samples.first() else {
            return Err(RecognitionError::ClassificationFailure(
                "cannot fit a classifier on zero samples".to_string(),
            ));
        };
        let dim = first.len();
        if let Some(line) = samples.iter().position(|(features, _)| features.len() != dim) {
            return Err(RecognitionError::MalformedDataset {
                line: line + 1,
                reason: format!("expected {dim} features"),
            });
        }
        Ok(Self { samples, dim })
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Distinct labels in first-seen order.
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = Vec::new();
        for (_, label) in &self.samples {
            if !classes.contains(&label.as_str()) {
                classes.push(label);
            }
        }
        classes
    }

    /// Label of the closest sample by Euclidean distance; the earliest
    /// sample wins ties.
    pub fn predict(&self, features: &[f32]) -> Result<&str, RecognitionError> {
        if features.len() != self.dim {
            return Err(RecognitionError::ClassificationFailure(format!(
                "expected {} features, got {}",
                self.dim,
                features.len()
            )));
        }

        let mut best: Option<(f32, &str)> = None;
        for (sample, label) in &self.samples {
            let distance: f32 = sample
                .iter()
                .zip(features)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if distance.is_nan() {
                continue;
            }
            if best.is_none_or(|(top, _)| distance < top) {
                best = Some((distance, label));
            }
        }

        best.map(|(_, label)| label).ok_or_else(|| {
            RecognitionError::ClassificationFailure("no comparable sample".to_string())
        })
    }
}

/// Reads a header-less CSV: every column but the last is a feature, the last
/// is the label. Blank lines are skipped.
pub fn load_dataset(path: &Path) -> Result<Vec<(Vec<f32>, String)>, RecognitionError> {
    let contents = std::fs::read_to_string(path).map_err(|err| {
        log::error!("failed to read dataset {}: {err}", path.display());
        RecognitionError::ResourceUnavailable {
            what: "dataset",
            path: path.to_path_buf(),
        }
    })?;

    let mut samples = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let Some((label, features)) = fields.split_last() else {
            continue;
        };
        if features.is_empty() {
            return Err(RecognitionError::MalformedDataset {
                line: idx + 1,
                reason: "row has no feature columns".to_string(),
            });
        }
        let features = features
            .iter()
            .map(|field| field.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|err| RecognitionError::MalformedDataset {
                line: idx + 1,
                reason: err.to_string(),
            })?;
        samples.push((features, label.to_string()));
    }

    if samples.is_empty() {
        return Err(RecognitionError::EmptyDataset(path.to_path_buf()));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "sign-stream-knn-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn sample(features: &[f32], label: &str) -> (Vec<f32>, String) {
        (features.to_vec(), label.to_string())
    }

    #[test]
    fn predicts_the_closest_label() {
        let knn = NearestNeighbor::fit(vec![
            sample(&[0.0, 0.0], "1"),
            sample(&[1.0, 1.0], "5"),
        ])
        .unwrap();
        assert_eq!(knn.predict(&[0.1, 0.2]).unwrap(), "1");
        assert_eq!(knn.predict(&[0.9, 0.6]).unwrap(), "5");
        assert_eq!(knn.classes(), vec!["1", "5"]);
        assert_eq!((knn.sample_count(), knn.dim()), (2, 2));
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let knn = NearestNeighbor::fit(vec![sample(&[0.0, 0.0], "1")]).unwrap();
        assert!(matches!(
            knn.predict(&[0.0]),
            Err(RecognitionError::ClassificationFailure(_))
        ));
        assert!(NearestNeighbor::fit(vec![sample(&[0.0], "a"), sample(&[0.0, 1.0], "b")]).is_err());
        assert!(NearestNeighbor::fit(Vec::new()).is_err());
    }

    #[test]
    fn loads_csv_with_label_in_last_column() {
        let path = temp_file("ok.csv", "0,0,0.5,-1,1\n\n0,0,-0.25,1,5\n");
        let samples = load_dataset(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], sample(&[0.0, 0.0, 0.5, -1.0], "1"));
        assert_eq!(samples[1].1, "5");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn dataset_errors_are_classified() {
        let missing = std::env::temp_dir().join("sign-stream-knn-does-not-exist.csv");
        assert!(matches!(
            load_dataset(&missing),
            Err(RecognitionError::ResourceUnavailable { .. })
        ));

        let empty = temp_file("empty.csv", "\n\n");
        assert!(matches!(
            load_dataset(&empty),
            Err(RecognitionError::EmptyDataset(_))
        ));
        std::fs::remove_file(empty).ok();

        let broken = temp_file("broken.csv", "0,abc,1\n");
        assert!(matches!(
            load_dataset(&broken),
            Err(RecognitionError::MalformedDataset { line: 1, .. })
        ));
        std::fs::remove_file(broken).ok();
    }
}
