pub mod catalog;
pub mod codec;
pub mod config;
pub mod model;
pub mod preset;

// Form engine and the scene controller built on it
pub mod app;
pub mod form;
pub mod input;
pub mod reducer;

// Deployments on disk
pub mod pipeline;
pub mod registry;
pub mod state;

// Async inventory lookups
pub mod lookup;
