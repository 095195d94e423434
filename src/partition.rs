use std::collections::HashMap;

use crate::{error::ConfigError, kmeans::KMeansConfig, pipeline::ClusteringPipeline};

/// How observations are spread over independent models.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partitioning {
    /// one model for the whole stream
    Single,
    /// one model per location; observations without a location share one model
    ByLocation,
}

/// Independent clustering pipelines, created on first use from a cold template.
///
/// Models never share state, so each one sees its own partition in delivery order.
pub struct PartitionedModels {
    partitioning: Partitioning,
    template: ClusteringPipeline,
    models: HashMap<Option<String>, ClusteringPipeline>,
}

impl PartitionedModels {
    pub fn new(config: KMeansConfig, partitioning: Partitioning) -> Result<Self, ConfigError> {
        Ok(Self {
            partitioning,
            template: ClusteringPipeline::new(config)?,
            models: HashMap::new(),
        })
    }

    /// The partition key of an observation located at `location`.
    pub fn key(&self, location: Option<&str>) -> Option<String> {
        match self.partitioning {
            Partitioning::Single => None,
            Partitioning::ByLocation => location.map(String::from),
        }
    }

    /// The model in charge of `key`.
    pub fn model_mut(&mut self, key: Option<String>) -> &mut ClusteringPipeline {
        let template = &self.template;
        self.models.entry(key).or_insert_with(|| template.clone())
    }

    pub fn model(&self, key: &Option<String>) -> Option<&ClusteringPipeline> {
        self.models.get(key)
    }

    /// Number of models created so far.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::partition::*;
    use crate::pipeline::tests::{build_sample, scenario_config};

    #[test]
    fn test_single_partition() {
        let mut models = PartitionedModels::new(scenario_config(), Partitioning::Single).unwrap();
        for (i, raw) in build_sample().iter().enumerate() {
            let city = if i % 2 == 0 { "Austin" } else { "Boston" };
            let key = models.key(Some(city));
            models.model_mut(key).process(raw);
        }
        assert_eq!(1, models.len());
        assert_eq!(6, models.model(&None).unwrap().scaler().count());
    }

    #[test]
    fn test_partition_by_location() {
        let mut models = PartitionedModels::new(scenario_config(), Partitioning::ByLocation).unwrap();
        let mut reference = ClusteringPipeline::new(scenario_config()).unwrap();
        for raw in build_sample() {
            let austin = models.key(Some("Austin"));
            let boston = models.key(Some("Boston"));
            assert_eq!(reference.process(&raw), models.model_mut(austin).process(&raw));
            models.model_mut(boston).process(&[0., 0.]);
        }
        let nowhere = models.key(None);
        models.model_mut(nowhere).process(&[1., 1.]);
        assert_eq!(3, models.len());
        let austin = models.model(&Some("Austin".into())).unwrap();
        assert_eq!(reference.model().centroids(), austin.model().centroids());
    }

    #[test]
    fn test_invalid_config() {
        let config = KMeansConfig {
            chunk_size: 0,
            ..KMeansConfig::default()
        };
        assert!(PartitionedModels::new(config, Partitioning::ByLocation).is_err());
    }
}
