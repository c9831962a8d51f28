//! Random forest of axis-aligned decision trees
//!
//! Trees route a sample left when `sample[feature] <= threshold`. Each leaf
//! holds per-class weights which are normalised into that tree's vote; the
//! forest averages the votes of all trees (soft voting).

use super::Classifier;
use crate::error::PredictionError;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal node with per-class weights (counts or fractions)
    Leaf { value: Vec<f64> },
    /// Internal node with split
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Single decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub root: TreeNode,
}

impl DecisionTree {
    pub fn new(root: TreeNode) -> Self {
        Self { root }
    }

    /// Leaf weights reached by `sample`
    fn leaf(&self, sample: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(format!(
                            "leaf has {} class weights, expected {}",
                            value.len(),
                            n_classes
                        ));
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err("leaf weights must be finite and non-negative".to_string());
                    }
                    if value.iter().sum::<f64>() <= 0.0 {
                        return Err("leaf weights sum to zero".to_string());
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "split on feature {} but model has {} features",
                            feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("split on feature {} has a non-finite threshold", feature));
                    }
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        Ok(())
    }
}

/// Soft-voting random forest classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(n_features: usize, n_classes: usize, trees: Vec<DecisionTree>) -> Self {
        Self {
            n_features,
            n_classes,
            trees,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError> {
        if features.len() != self.n_features {
            return Err(PredictionError::Classifier(format!(
                "forest expects {} features, got {}",
                self.n_features,
                features.len()
            )));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf(features);
            let total: f64 = leaf.iter().sum();
            for (p, w) in proba.iter_mut().zip(leaf) {
                *p += w / total;
            }
        }

        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }

    /// Check the structure so inference can index without bounds failures
    fn validate(&self) -> Result<(), String> {
        if self.n_classes == 0 {
            return Err("forest has no classes".to_string());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|reason| format!("tree {}: {}", i, reason))?;
        }
        Ok(())
    }
}
