//! Standardization followed by clustering, one observation at a time.
//!
//! Every observation is scored with the state left by the observations before it, and only then
//! folded into that state.

use crate::{
    error::ConfigError,
    kmeans::{KMeansConfig, StreamingKMeans},
    observation::{FeatureVector, FEATURES},
    scaler::RunningScaler,
};

/// Index of the centroid an observation was assigned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterAssignment(usize);

impl ClusterAssignment {
    pub fn new(index: usize) -> Self {
        ClusterAssignment(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// A running scaler feeding a streaming k-means model.
#[derive(Clone, Debug)]
pub struct ClusteringPipeline {
    scaler: RunningScaler<FEATURES>,
    model: StreamingKMeans<FEATURES>,
}

impl ClusteringPipeline {
    /// Builds a cold pipeline.
    pub fn new(config: KMeansConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            scaler: RunningScaler::new(),
            model: StreamingKMeans::new(config)?,
        })
    }

    /// Assigns `raw` with the current state, `None` while the model holds fewer than two centroids.
    pub fn predict(&self, raw: &FeatureVector) -> Option<ClusterAssignment> {
        let standardized = self.scaler.standardize(raw);
        self.model
            .predict(&standardized)
            .ok()
            .map(ClusterAssignment::new)
    }

    /// Folds `raw` into the scaler, moves the centroids along with the statistics, then trains
    /// the model on `raw` standardized with the updated statistics.
    pub fn update(&mut self, raw: &FeatureVector) {
        let previous = self.scaler.clone();
        self.scaler.update(raw);
        let scaler = &self.scaler;
        self.model.remap(|point| scaler.rebase(&previous, point));
        self.model.learn(self.scaler.standardize(raw));
    }

    /// Predicts, then updates.
    pub fn process(&mut self, raw: &FeatureVector) -> Option<ClusterAssignment> {
        let assignment = self.predict(raw);
        self.update(raw);
        assignment
    }

    /// Predicts and hands the assignment to `emit`; the pipeline only learns `raw` when `emit`
    /// succeeds.
    pub fn try_process<T, E, F>(&mut self, raw: &FeatureVector, emit: F) -> Result<T, E>
    where
        F: FnOnce(Option<ClusterAssignment>) -> Result<T, E>,
    {
        let emitted = emit(self.predict(raw))?;
        self.update(raw);
        Ok(emitted)
    }

    pub fn scaler(&self) -> &RunningScaler<FEATURES> {
        &self.scaler
    }

    pub fn model(&self) -> &StreamingKMeans<FEATURES> {
        &self.model
    }
}
