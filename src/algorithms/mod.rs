pub mod als;
pub mod features;
pub mod initializer;
pub mod matrix;
pub mod rating;
pub mod similarity;
pub mod tfidf;

pub use als::{split_triples, AlsConfig, AlsTrainer, TrainedModel, TrainingControl};
pub use features::{build_item_features, JoinPolicy};
pub use matrix::{DenseIndex, RatingMatrix};
pub use rating::{ColumnTable, RatingDeriver, RatingWeights};
pub use similarity::ContentIndex;
pub use tfidf::TfidfVectorizer;
