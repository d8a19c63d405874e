pub mod classifier;
pub mod label;
pub mod query;

pub use classifier::{ClassifierMode, SizeClassifier};
pub use label::SizeLabel;
pub use query::{Gender, QueryMeasurements, RecommendationQuery};
