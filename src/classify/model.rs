use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::features::{FeatureVector, FEATURE_COUNT};

/// Output classes in the order the model scores them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ActivityLabel {
    Downstairs,
    Office,
    Sitting,
    Upstairs,
    Walking,
}

impl ActivityLabel {
    pub const ALL: [ActivityLabel; 5] = [
        ActivityLabel::Downstairs,
        ActivityLabel::Office,
        ActivityLabel::Sitting,
        ActivityLabel::Upstairs,
        ActivityLabel::Walking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLabel::Downstairs => "Downstairs",
            ActivityLabel::Office => "Office",
            ActivityLabel::Sitting => "Sitting",
            ActivityLabel::Upstairs => "Upstairs",
            ActivityLabel::Walking => "Walking",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A pre-trained classifier producing one score per [`ActivityLabel`].
pub trait ActivityModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Vec<f32>>;
}

/// Index of the highest score; the first one wins a tie. NaN scores are
/// skipped.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Scores `features` and picks the winning label.
pub fn predict_label(model: &dyn ActivityModel, features: &FeatureVector) -> Result<ActivityLabel> {
    let scores = model.predict(features)?;
    if scores.len() != ActivityLabel::ALL.len() {
        bail!(
            "model returned {} scores, expected {}",
            scores.len(),
            ActivityLabel::ALL.len()
        );
    }
    if scores.iter().any(|score| score.is_nan()) {
        bail!("model returned a NaN score");
    }
    argmax(&scores)
        .and_then(ActivityLabel::from_index)
        .ok_or_else(|| anyhow!("model returned no usable score"))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Row-major `[outputs][inputs]`.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default = "default_activation")]
    pub activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Linear
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    fn outputs(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut output: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, bias)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + bias)
            .collect();

        match self.activation {
            Activation::Linear => {}
            Activation::Relu => output.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => softmax(&mut output),
        }
        output
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut total = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        total += *v;
    }
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

/// Fully connected network exported as JSON.
///
/// ```json
/// {"layers": [{"weights": [[...]], "bias": [...], "activation": "relu"}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModel {
    pub layers: Vec<DenseLayer>,
}

impl DenseModel {
    pub fn from_json(json: &str) -> Result<Self> {
        let model: DenseModel = serde_json::from_str(json).context("Failed to parse model")?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model from {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("Invalid model {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let mut expected_inputs = FEATURE_COUNT;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.outputs() == 0 || layer.bias.len() != layer.outputs() {
                bail!("layer {} has mismatched bias", index);
            }
            if layer.weights.iter().any(|row| row.len() != expected_inputs) {
                bail!(
                    "layer {} expects {} inputs, previous layer produces {}",
                    index,
                    layer.inputs(),
                    expected_inputs
                );
            }
            expected_inputs = layer.outputs();
        }

        if self.layers.is_empty() || expected_inputs != ActivityLabel::ALL.len() {
            bail!(
                "model must end in {} outputs, got {}",
                ActivityLabel::ALL.len(),
                expected_inputs
            );
        }
        Ok(())
    }
}

impl ActivityModel for DenseModel {
    fn predict(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        let output = self
            .layers
            .iter()
            .fold(features.as_slice().to_vec(), |input, layer| layer.forward(&input));
        Ok(output)
    }
}
