pub mod space;
pub mod observation;
pub mod scaler;
pub mod kmeans;
pub mod pipeline;
pub mod partition;
pub mod bus;
pub mod processor;
pub mod service;
pub mod config;
pub mod error;
