pub mod batch;
pub mod config;
pub mod data;
pub mod encode;
pub mod error;
pub mod grid;
pub mod impute;
pub mod mask;
pub mod pipeline;
pub mod pivot;
pub mod resolver;
pub mod select;
pub mod summarize;
pub mod types;
