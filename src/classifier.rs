use crate::normalize::TextNormalizer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Trained text-classification pipeline, exported to JSON by the training
/// side: tf-idf vectorizer state plus the linear model's weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Category labels, in the order the coefficient rows use.
    pub classes: Vec<String>,
    /// Word n-gram range of the vectorizer, inclusive.
    pub ngram_range: (usize, usize),
    /// Term -> feature index.
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per feature index.
    pub idf: Vec<f64>,
    /// One row per class (or a single row for a binary model).
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("model artifact not found at {path}")]
    ModelNotFound { path: String },
    #[error("model artifact is malformed: {0}")]
    Malformed(String),
    #[error("prediction failed: {0}")]
    Prediction(String),
}

/// Wraps the trained model, loaded once at process start and shared by
/// handle afterwards. Classification itself is stateless.
#[derive(Debug)]
pub struct ClassifierService {
    artifact: ModelArtifact,
    normalizer: TextNormalizer,
}

impl ClassifierService {
    /// Reads and validates the model artifact. Called once at startup; a
    /// missing artifact is fatal for moderation.
    pub fn load(path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(path).exists() {
            return Err(ClassifierError::ModelNotFound {
                path: path.to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ClassifierError::Malformed(
            format!("unreadable artifact {path}: {e}"),
        ))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|e| ClassifierError::Malformed(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ClassifierError> {
        validate_artifact(&artifact)?;
        Ok(Self {
            artifact,
            normalizer: TextNormalizer::new(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.artifact.classes
    }

    /// Returns the most probable label and its probability for the given
    /// raw message text. Deterministic for a fixed artifact.
    pub fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let normalized = self.normalizer.normalize(text);
        let features = self.vectorize(&normalized);
        let probabilities = self.probabilities(&features)?;

        let (best_idx, best_prob) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| ClassifierError::Prediction("empty probability vector".to_string()))?;

        if !best_prob.is_finite() || !(0.0..=1.0).contains(&best_prob) {
            return Err(ClassifierError::Prediction(format!(
                "probability {best_prob} out of range for label {}",
                self.artifact.classes[best_idx]
            )));
        }

        Ok(Prediction {
            label: self.artifact.classes[best_idx].clone(),
            confidence: best_prob,
        })
    }

    /// Sparse L2-normalized tf-idf vector over the artifact's vocabulary.
    fn vectorize(&self, normalized: &str) -> HashMap<usize, f64> {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let (lo, hi) = self.artifact.ngram_range;

        let mut counts: HashMap<usize, f64> = HashMap::new();
        for n in lo..=hi {
            if n == 0 || n > tokens.len() {
                continue;
            }
            for window in tokens.windows(n) {
                let ngram = window.join(" ");
                if let Some(&idx) = self.artifact.vocabulary.get(&ngram) {
                    *counts.entry(idx).or_insert(0.0) += 1.0;
                }
            }
        }

        for (idx, value) in counts.iter_mut() {
            *value *= self.artifact.idf[*idx];
        }

        let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in counts.values_mut() {
                *value /= norm;
            }
        }
        counts
    }

    fn probabilities(&self, features: &HashMap<usize, f64>) -> Result<Vec<f64>, ClassifierError> {
        let artifact = &self.artifact;
        let scores: Vec<f64> = artifact
            .coefficients
            .iter()
            .zip(&artifact.intercepts)
            .map(|(row, intercept)| {
                intercept
                    + features
                        .iter()
                        .map(|(&idx, &value)| row[idx] * value)
                        .sum::<f64>()
            })
            .collect();

        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ClassifierError::Prediction(
                "non-finite decision score".to_string(),
            ));
        }

        // A binary model carries a single coefficient row scoring the
        // second class; multiclass models get a softmax over all rows.
        if scores.len() == 1 {
            let positive = 1.0 / (1.0 + (-scores[0]).exp());
            return Ok(vec![1.0 - positive, positive]);
        }

        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        Ok(exps.iter().map(|e| e / total).collect())
    }
}

fn validate_artifact(artifact: &ModelArtifact) -> Result<(), ClassifierError> {
    let n_features = artifact.idf.len();
    if artifact.classes.is_empty() {
        return Err(ClassifierError::Malformed("no classes".to_string()));
    }
    if artifact.vocabulary.is_empty() {
        return Err(ClassifierError::Malformed("empty vocabulary".to_string()));
    }
    let (lo, hi) = artifact.ngram_range;
    if lo == 0 || lo > hi {
        return Err(ClassifierError::Malformed(format!(
            "invalid ngram_range ({lo}, {hi})"
        )));
    }
    if let Some(&bad) = artifact.vocabulary.values().find(|&&idx| idx >= n_features) {
        return Err(ClassifierError::Malformed(format!(
            "vocabulary index {bad} exceeds {n_features} idf weights"
        )));
    }

    let expected_rows = if artifact.classes.len() == 2 {
        // Binary models may store either one decision row or one per class.
        [1, 2].contains(&artifact.coefficients.len())
    } else {
        artifact.coefficients.len() == artifact.classes.len()
    };
    if !expected_rows {
        return Err(ClassifierError::Malformed(format!(
            "{} coefficient rows for {} classes",
            artifact.coefficients.len(),
            artifact.classes.len()
        )));
    }
    if artifact.intercepts.len() != artifact.coefficients.len() {
        return Err(ClassifierError::Malformed(format!(
            "{} intercepts for {} coefficient rows",
            artifact.intercepts.len(),
            artifact.coefficients.len()
        )));
    }
    if let Some(row) = artifact.coefficients.iter().find(|r| r.len() != n_features) {
        return Err(ClassifierError::Malformed(format!(
            "coefficient row has {} entries, expected {n_features}",
            row.len()
        )));
    }
    Ok(())
}

impl ModelArtifact {
    /// Small hand-weighted pipeline over the standard category set. Backs
    /// `--demo` and `--generate-model` so the moderation path can be
    /// exercised before a real model has been trained.
    pub fn demo() -> Self {
        let terms = [
            ("worthless", 0),
            ("loser", 1),
            ("quit", 2),
            ("you are", 3),
            ("idiot", 4),
            ("free", 5),
            ("winner", 6),
            ("click", 7),
            ("prize", 8),
            ("crypto", 9),
            ("investment", 10),
            ("guaranteed", 11),
            ("double your", 12),
            ("bank", 13),
            ("verify", 14),
            ("account", 15),
            ("password", 16),
            ("urgent", 17),
            ("thanks", 18),
            ("meeting", 19),
            ("great", 20),
        ];
        let n = terms.len();
        let vocabulary: HashMap<String, usize> =
            terms.iter().map(|(t, i)| (t.to_string(), *i)).collect();

        let weights = |pairs: &[(usize, f64)]| {
            let mut row = vec![0.0; n];
            for &(idx, w) in pairs {
                row[idx] = w;
            }
            row
        };

        let bullying = weights(&[(0, 4.0), (1, 4.0), (2, 2.5), (3, 2.0), (4, 4.0)]);
        let normal = weights(&[(18, 0.3), (19, 0.3), (20, 0.3)]);
        let scam = weights(&[
            (9, 2.5),
            (10, 2.5),
            (11, 2.0),
            (12, 3.0),
            (13, 3.0),
            (14, 3.0),
            (15, 2.5),
            (16, 3.0),
            (17, 2.0),
        ]);
        let spam = weights(&[(5, 2.8), (6, 3.0), (7, 2.5), (8, 3.0), (11, 1.5)]);

        ModelArtifact {
            classes: vec![
                "bullying".to_string(),
                "normal".to_string(),
                "scam".to_string(),
                "spam".to_string(),
            ],
            ngram_range: (1, 2),
            vocabulary,
            idf: vec![1.0; n],
            coefficients: vec![bullying, normal, scam, spam],
            intercepts: vec![0.0, 0.5, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_service() -> ClassifierService {
        ClassifierService::from_artifact(ModelArtifact::demo()).unwrap()
    }

    #[test]
    fn missing_artifact_is_reported() {
        let err = ClassifierService::load("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, ClassifierError::ModelNotFound { .. }));
    }

    #[test]
    fn loads_artifact_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        std::fs::write(
            &path,
            serde_json::to_string(&ModelArtifact::demo()).unwrap(),
        )
        .unwrap();

        let service = ClassifierService::load(path.to_str().unwrap()).unwrap();
        assert_eq!(service.labels().len(), 4);
    }

    #[test]
    fn rejects_mismatched_coefficients() {
        let mut artifact = ModelArtifact::demo();
        artifact.coefficients.pop();
        let err = ClassifierService::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, ClassifierError::Malformed(_)));
    }

    #[test]
    fn rejects_short_idf_vector() {
        let mut artifact = ModelArtifact::demo();
        artifact.idf.truncate(3);
        assert!(ClassifierService::from_artifact(artifact).is_err());
    }

    #[test]
    fn confidence_is_bounded_and_label_known() {
        let service = demo_service();
        let samples = [
            "you are worthless and should quit",
            "free crypto click here",
            "totally unrelated words",
            "",
            "<@123> !!!",
        ];
        for sample in samples {
            let prediction = service.classify(sample).unwrap();
            assert!(
                (0.0..=1.0).contains(&prediction.confidence),
                "confidence out of range for {sample:?}"
            );
            assert!(service.labels().contains(&prediction.label));
        }
    }

    #[test]
    fn flags_abusive_message_with_high_confidence() {
        let service = demo_service();
        let prediction = service.classify("you are worthless and should quit").unwrap();
        assert_eq!(prediction.label, "bullying");
        assert!(prediction.confidence > 0.9, "got {}", prediction.confidence);
    }

    #[test]
    fn is_deterministic() {
        let service = demo_service();
        let a = service.classify("free prize winner click now").unwrap();
        let b = service.classify("free prize winner click now").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uses_bigram_features() {
        let service = demo_service();
        // "you are" only scores as a bigram; the unigrams are unknown.
        let prediction = service.classify("you are").unwrap();
        assert_eq!(prediction.label, "bullying");
    }

    #[test]
    fn binary_model_uses_sigmoid() {
        let artifact = ModelArtifact {
            classes: vec!["normal".to_string(), "toxic".to_string()],
            ngram_range: (1, 1),
            vocabulary: HashMap::from([("jerk".to_string(), 0)]),
            idf: vec![1.0],
            coefficients: vec![vec![2.0]],
            intercepts: vec![-1.0],
        };
        let service = ClassifierService::from_artifact(artifact).unwrap();

        let prediction = service.classify("what a jerk").unwrap();
        assert_eq!(prediction.label, "toxic");
        // sigmoid(2.0 * 1.0 - 1.0)
        assert!((prediction.confidence - 0.731_058_6).abs() < 1e-6);

        let benign = service.classify("nothing matches").unwrap();
        assert_eq!(benign.label, "normal");
        // sigmoid(-1.0) = 0.2689 for toxic, so normal wins at 0.7311.
        assert!((benign.confidence - 0.731_058_6).abs() < 1e-6);
    }
}
