pub mod config;
pub mod measure;
pub mod pose;
pub mod protocol;
pub mod replay;
pub mod sizing;
