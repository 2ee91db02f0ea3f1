//! On-device activity classification of drained sensor windows.

pub mod features;
pub mod model;
pub mod task;

pub use features::{extract_features, FeatureVector, SeriesStats};
pub use model::{argmax, predict_label, ActivityLabel, ActivityModel, DenseModel};
pub use task::{classify_batch, ClassificationTask};
