pub mod adapters;
pub mod config;
pub mod counties;
pub mod error;
pub mod features;
pub mod geo;
pub mod join;
pub mod loader;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod quality;
pub mod raster;
pub mod reconcile;
pub mod scoring;
pub mod summary;
pub mod utils;
