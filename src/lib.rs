pub mod image_pipeline;
pub mod logger;
pub mod regression;
