//! Numeric building blocks for the training stages.

pub mod classifier;
pub mod drift;
pub mod imputer;
pub mod metrics;
pub mod model;

pub use classifier::{LogisticRegression, TrainParams};
pub use drift::{ks_2samp, KsResult};
pub use imputer::KnnImputer;
pub use metrics::classification_score;
pub use model::ModelBundle;
