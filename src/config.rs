use std::net::SocketAddr;

use clap::Parser;
use log::LevelFilter;
use url::Url;

use crate::{
    error::ConfigError,
    kmeans::KMeansConfig,
    partition::Partitioning,
    processor::Topics,
};

/// Clusters a stream of weather observations online and republishes them annotated.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Config {
    /// Websocket endpoint served to producers and subscribers
    #[clap(long, value_parser, env = "FLUENT_WEATHER_LISTEN", default_value = "ws://127.0.0.1:9001")]
    pub listen: Url,

    /// Topic the observations are read from
    #[clap(long, value_parser, env = "FLUENT_WEATHER_INPUT_TOPIC", default_value = "weather-forecasts")]
    pub input_topic: String,

    /// Topic the annotated observations are published to
    #[clap(long, value_parser, env = "FLUENT_WEATHER_OUTPUT_TOPIC", default_value = "city-clusters")]
    pub output_topic: String,

    /// Topic centroid snapshots are published to after each observation
    #[clap(long, value_parser, env = "FLUENT_WEATHER_MODEL_TOPIC")]
    pub model_topic: Option<String>,

    /// Maximum number of clusters
    #[clap(short = 'k', long, value_parser, env = "FLUENT_WEATHER_CLUSTERS", default_value = "5")]
    pub clusters: usize,

    /// Number of observations after which a cluster weight is halved
    #[clap(long, value_parser, env = "FLUENT_WEATHER_HALFLIFE", default_value = "100")]
    pub halflife: f64,

    /// Number of observations buffered before the clusters are updated
    #[clap(long, value_parser, env = "FLUENT_WEATHER_CHUNK_SIZE", default_value = "3")]
    pub chunk_size: usize,

    /// Standardized distance from every cluster above which a new cluster is opened
    #[clap(long, value_parser, env = "FLUENT_WEATHER_SPAWN_RADIUS", default_value = "0.5")]
    pub spawn_radius: f64,

    /// Seed of the tie-break generator
    #[clap(long, value_parser, env = "FLUENT_WEATHER_SEED", default_value = "0")]
    pub seed: u64,

    /// Keep one model per location
    #[clap(long, action, env = "FLUENT_WEATHER_PARTITION_BY_LOCATION")]
    pub partition_by_location: bool,

    /// More logs (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn kmeans(&self) -> KMeansConfig {
        KMeansConfig {
            k: self.clusters,
            halflife: self.halflife,
            chunk_size: self.chunk_size,
            spawn_radius: self.spawn_radius,
            seed: self.seed,
        }
    }

    pub fn partitioning(&self) -> Partitioning {
        if self.partition_by_location {
            Partitioning::ByLocation
        } else {
            Partitioning::Single
        }
    }

    pub fn topics(&self) -> Topics {
        Topics {
            input: self.input_topic.clone(),
            output: self.output_topic.clone(),
            model: self.model_topic.clone(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Resolves the `ws://` listen URL to a socket address.
    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = |reason| ConfigError::Listen(self.listen.to_string(), reason);
        if self.listen.scheme() != "ws" {
            return Err(invalid("only ws:// is served"));
        }
        self.listen
            .socket_addrs(|| None)
            .map_err(|_| invalid("cannot resolve host"))?
            .into_iter()
            .next()
            .ok_or_else(|| invalid("no address"))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["fluent_weather"]).unwrap();
        assert_eq!(KMeansConfig::default(), config.kmeans());
        assert_eq!(Partitioning::Single, config.partitioning());
        assert_eq!(
            Topics {
                input: "weather-forecasts".into(),
                output: "city-clusters".into(),
                model: None
            },
            config.topics()
        );
        assert_eq!(LevelFilter::Info, config.log_level());
        assert_eq!("127.0.0.1:9001".parse::<SocketAddr>().unwrap(), config.listen_address().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "fluent_weather",
            "-k",
            "2",
            "--halflife",
            "0.5",
            "--chunk-size",
            "1",
            "--model-topic",
            "city-models",
            "--partition-by-location",
            "-vv",
        ])
        .unwrap();
        assert_eq!(2, config.kmeans().k);
        assert_eq!(0.5, config.kmeans().halflife);
        assert_eq!(1, config.kmeans().chunk_size);
        assert_eq!(Some("city-models".into()), config.topics().model);
        assert_eq!(Partitioning::ByLocation, config.partitioning());
        assert_eq!(LevelFilter::Trace, config.log_level());
    }

    #[test]
    fn test_listen_scheme() {
        let config = Config::try_parse_from(["fluent_weather", "--listen", "http://127.0.0.1:80"]).unwrap();
        assert!(matches!(config.listen_address(), Err(ConfigError::Listen(_, _))));
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(Config::try_parse_from(["fluent_weather", "--listen", "not a url"]).is_err());
    }
}
