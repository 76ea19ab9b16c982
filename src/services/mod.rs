pub mod content;
pub mod data_source;
pub mod recommendation;
pub mod training;
