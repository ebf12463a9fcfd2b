//! Native JSON encoding of tree ensembles and linear regressors
//!
//! Document shape:
//!
//! ```json
//! {
//!   "format": "tree-ensemble",
//!   "version": 1,
//!   "kind": "forest",
//!   "n_features": 4,
//!   "feature_importances": [0.91, 0.02, 0.03, 0.04],
//!   "trees": [
//!     {"nodes": [
//!       {"feature": 0, "threshold": 20.5, "left": 1, "right": 2},
//!       {"value": 470.1},
//!       {"value": 441.3}
//!     ]}
//!   ]
//! }
//! ```
//!
//! Splits send `x[feature] <= threshold` to the left child. Child indices must
//! be strictly greater than their parent's index, so every traversal ends at a
//! leaf.

use super::{ArtifactFormat, ModelArtifact};
use crate::models::FEATURE_COUNT;
use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;

const FORMAT_TAG: &str = "tree-ensemble";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleKind {
    /// Averaged trees (random forest)
    Forest,
    /// Summed trees scaled by a learning rate (gradient boosting)
    Boosted,
    /// A single decision tree
    Tree,
    /// Linear regression, no trees
    Linear,
}

impl EnsembleKind {
    fn default_model_type(&self) -> &'static str {
        match self {
            EnsembleKind::Forest => "RandomForestRegressor",
            EnsembleKind::Boosted => "GradientBoostingRegressor",
            EnsembleKind::Tree => "DecisionTreeRegressor",
            EnsembleKind::Linear => "LinearRegression",
        }
    }

    fn is_ensemble(&self) -> bool {
        matches!(self, EnsembleKind::Forest | EnsembleKind::Boosted)
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    format: String,
    version: u32,
    kind: EnsembleKind,
    #[serde(default)]
    model_type: Option<String>,
    n_features: usize,
    #[serde(default)]
    base_score: f64,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    #[serde(default)]
    coefficients: Vec<f64>,
    #[serde(default)]
    intercept: f64,
    #[serde(default)]
    feature_importances: Option<Vec<f64>>,
    #[serde(default)]
    trees: Vec<TreeDocument>,
}

fn default_learning_rate() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    nodes: Vec<NodeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeDocument {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_document(doc: &TreeDocument, tree_idx: usize) -> Result<Self> {
        ensure!(!doc.nodes.is_empty(), "tree {} has no nodes", tree_idx);

        let node_count = doc.nodes.len();
        let mut nodes = Vec::with_capacity(node_count);
        for (idx, node) in doc.nodes.iter().enumerate() {
            let node = match *node {
                NodeDocument::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    ensure!(
                        feature < FEATURE_COUNT,
                        "tree {} node {} splits on feature {}, expected < {}",
                        tree_idx,
                        idx,
                        feature,
                        FEATURE_COUNT
                    );
                    ensure!(
                        threshold.is_finite(),
                        "tree {} node {} has a non-finite threshold",
                        tree_idx,
                        idx
                    );
                    for child in [left, right] {
                        ensure!(
                            child > idx && child < node_count,
                            "tree {} node {} has invalid child index {}",
                            tree_idx,
                            idx,
                            child
                        );
                    }
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    }
                }
                NodeDocument::Leaf { value } => {
                    ensure!(
                        value.is_finite(),
                        "tree {} node {} has a non-finite leaf value",
                        tree_idx,
                        idx
                    );
                    Node::Leaf(value)
                }
            };
            nodes.push(node);
        }

        Ok(Self { nodes })
    }

    fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Decoded tree ensemble or linear model
#[derive(Debug, Clone)]
pub struct TreeEnsembleModel {
    kind: EnsembleKind,
    model_type: String,
    trees: Vec<Tree>,
    base_score: f64,
    learning_rate: f64,
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
    importances: Option<Vec<f64>>,
}

impl TreeEnsembleModel {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let doc: Document =
            serde_json::from_slice(bytes).context("not a tree-ensemble JSON document")?;
        Self::from_document(doc)
    }

    fn from_document(doc: Document) -> Result<Self> {
        ensure!(
            doc.format == FORMAT_TAG,
            "unexpected format tag '{}', expected '{}'",
            doc.format,
            FORMAT_TAG
        );
        ensure!(
            doc.version == FORMAT_VERSION,
            "unsupported version {}, expected {}",
            doc.version,
            FORMAT_VERSION
        );
        ensure!(
            doc.n_features == FEATURE_COUNT,
            "model expects {} features, expected {}",
            doc.n_features,
            FEATURE_COUNT
        );

        let trees = doc
            .trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| Tree::from_document(tree, idx))
            .collect::<Result<Vec<_>>>()?;

        let mut coefficients = [0.0; FEATURE_COUNT];
        match doc.kind {
            EnsembleKind::Forest | EnsembleKind::Boosted => {
                ensure!(!trees.is_empty(), "{:?} model has no trees", doc.kind);
            }
            EnsembleKind::Tree => {
                ensure!(
                    trees.len() == 1,
                    "single-tree model has {} trees",
                    trees.len()
                );
            }
            EnsembleKind::Linear => {
                if doc.coefficients.len() != FEATURE_COUNT {
                    bail!(
                        "linear model has {} coefficients, expected {}",
                        doc.coefficients.len(),
                        FEATURE_COUNT
                    );
                }
                ensure!(
                    doc.coefficients.iter().all(|c| c.is_finite()) && doc.intercept.is_finite(),
                    "linear model has non-finite terms"
                );
                coefficients.copy_from_slice(&doc.coefficients);
            }
        }

        ensure!(
            doc.base_score.is_finite() && doc.learning_rate.is_finite(),
            "non-finite base score or learning rate"
        );

        let importances = doc
            .feature_importances
            .map(normalize_importances)
            .transpose()?;

        Ok(Self {
            kind: doc.kind,
            model_type: doc
                .model_type
                .unwrap_or_else(|| doc.kind.default_model_type().to_string()),
            trees,
            base_score: doc.base_score,
            learning_rate: doc.learning_rate,
            coefficients,
            intercept: doc.intercept,
            importances,
        })
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        match self.kind {
            EnsembleKind::Forest => {
                let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
                sum / self.trees.len() as f64
            }
            EnsembleKind::Boosted => {
                let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
                self.base_score + self.learning_rate * sum
            }
            EnsembleKind::Tree => self.trees[0].evaluate(features),
            EnsembleKind::Linear => {
                self.intercept
                    + self
                        .coefficients
                        .iter()
                        .zip(features)
                        .map(|(c, x)| c * x)
                        .sum::<f64>()
            }
        }
    }
}

/// Validate importances and rescale them to sum to 1
fn normalize_importances(weights: Vec<f64>) -> Result<Vec<f64>> {
    ensure!(
        weights.len() == FEATURE_COUNT,
        "{} feature importances, expected {}",
        weights.len(),
        FEATURE_COUNT
    );
    ensure!(
        weights.iter().all(|w| w.is_finite() && *w >= 0.0),
        "feature importances must be finite and non-negative"
    );

    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        Ok(weights.iter().map(|w| w / total).collect())
    } else {
        Ok(weights)
    }
}

impl ModelArtifact for TreeEnsembleModel {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64> {
        Ok(self.evaluate(features))
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        self.importances.as_deref()
    }

    fn estimator_count(&self) -> Option<usize> {
        self.kind.is_ensemble().then_some(self.trees.len())
    }
}

/// `tree-ensemble-json` artifact format
pub struct TreeEnsembleFormat;

impl ArtifactFormat for TreeEnsembleFormat {
    fn name(&self) -> &'static str {
        "tree-ensemble-json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Box<dyn ModelArtifact>> {
        Ok(Box::new(TreeEnsembleModel::from_json(bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest_json() -> &'static str {
        r#"{
            "format": "tree-ensemble",
            "version": 1,
            "kind": "forest",
            "n_features": 4,
            "feature_importances": [9.0, 0.5, 0.25, 0.25],
            "trees": [
                {"nodes": [
                    {"feature": 0, "threshold": 20.0, "left": 1, "right": 2},
                    {"value": 470.0},
                    {"value": 440.0}
                ]},
                {"nodes": [
                    {"feature": 3, "threshold": 50.0, "left": 1, "right": 2},
                    {"value": 480.0},
                    {"feature": 0, "threshold": 25.0, "left": 3, "right": 4},
                    {"value": 450.0},
                    {"value": 430.0}
                ]}
            ]
        }"#
    }

    #[test]
    fn test_forest_averages_trees() {
        let model = TreeEnsembleModel::from_json(forest_json().as_bytes()).unwrap();

        // Tree 1: 15 <= 20 -> 470; tree 2: 45 <= 50 -> 480
        let cool = model.predict(&[15.0, 1010.0, 70.0, 45.0]).unwrap();
        assert!((cool - 475.0).abs() < 1e-9);

        // Tree 1: 30 > 20 -> 440; tree 2: 60 > 50, 30 > 25 -> 430
        let hot = model.predict(&[30.0, 1010.0, 70.0, 60.0]).unwrap();
        assert!((hot - 435.0).abs() < 1e-9);

        assert_eq!(model.estimator_count(), Some(2));
        assert_eq!(model.model_type(), "RandomForestRegressor");
    }

    #[test]
    fn test_importances_normalized() {
        let model = TreeEnsembleModel::from_json(forest_json().as_bytes()).unwrap();
        let importances = model.feature_importances().unwrap();
        assert!((importances[0] - 0.9).abs() < 1e-9);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_boosted_sums_with_learning_rate() {
        let json = r#"{
            "format": "tree-ensemble", "version": 1, "kind": "boosted",
            "n_features": 4, "base_score": 450.0, "learning_rate": 0.5,
            "trees": [
                {"nodes": [{"feature": 0, "threshold": 20.0, "left": 1, "right": 2},
                           {"value": 10.0}, {"value": -10.0}]},
                {"nodes": [{"value": 4.0}]}
            ]
        }"#;
        let model = TreeEnsembleModel::from_json(json.as_bytes()).unwrap();
        let value = model.predict(&[10.0, 1000.0, 50.0, 40.0]).unwrap();
        assert!((value - 457.0).abs() < 1e-9);
        assert_eq!(model.model_type(), "GradientBoostingRegressor");
    }

    #[test]
    fn test_linear_model_has_no_ensemble_metadata() {
        let json = r#"{
            "format": "tree-ensemble", "version": 1, "kind": "linear",
            "n_features": 4, "coefficients": [-2.0, 0.0, 0.0, 0.0], "intercept": 500.0
        }"#;
        let model = TreeEnsembleModel::from_json(json.as_bytes()).unwrap();
        assert!((model.predict(&[20.0, 0.0, 0.0, 0.0]).unwrap() - 460.0).abs() < 1e-9);
        assert_eq!(model.estimator_count(), None);
        assert!(model.feature_importances().is_none());
        assert_eq!(model.model_type(), "LinearRegression");
    }

    #[test]
    fn test_rejects_backward_child_index() {
        let json = r#"{
            "format": "tree-ensemble", "version": 1, "kind": "tree", "n_features": 4,
            "trees": [{"nodes": [
                {"feature": 0, "threshold": 1.0, "left": 1, "right": 2},
                {"feature": 1, "threshold": 1.0, "left": 0, "right": 2},
                {"value": 1.0}
            ]}]
        }"#;
        let err = TreeEnsembleModel::from_json(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid child index"));
    }

    #[test]
    fn test_rejects_wrong_feature_count() {
        let json = r#"{
            "format": "tree-ensemble", "version": 1, "kind": "forest", "n_features": 5,
            "trees": [{"nodes": [{"value": 1.0}]}]
        }"#;
        assert!(TreeEnsembleModel::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_foreign_json() {
        let json = r#"{"format": "something-else", "version": 1, "kind": "forest", "n_features": 4}"#;
        assert!(TreeEnsembleModel::from_json(json.as_bytes()).is_err());
        assert!(TreeEnsembleModel::from_json(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn test_rejects_short_importances() {
        let json = r#"{
            "format": "tree-ensemble", "version": 1, "kind": "forest", "n_features": 4,
            "feature_importances": [0.5, 0.5],
            "trees": [{"nodes": [{"value": 450.0}]}]
        }"#;
        assert!(TreeEnsembleModel::from_json(json.as_bytes()).is_err());
    }
}
