use std::{thread, time::Duration};

use fluent_weather::{
    bus::{Bus, JSON},
    kmeans::KMeansConfig,
    partition::{PartitionedModels, Partitioning},
    processor::{EventProcessor, Topics},
    service::WsBus,
};
use serde_json::Value;
use tungstenite::{connect, Message};
use url::Url;

#[path = "./utilities.rs"]
mod utilities;
use utilities::{assert_results, scenario};

#[test]
fn test_service() {
    let bus = WsBus::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let port = bus.local_addr().port();
    thread::spawn(move || {
        let config = KMeansConfig {
            k: 2,
            ..KMeansConfig::default()
        };
        let models = PartitionedModels::new(config, Partitioning::Single).unwrap();
        let topics = Topics {
            input: "weather-forecasts".into(),
            output: "city-clusters".into(),
            model: None,
        };
        EventProcessor::new(bus, topics, models).run().unwrap();
    });

    let clusters_url = format!("ws://127.0.0.1:{}/ws/subscribe/city-clusters", port);
    let (mut clusters_socket, _resp) =
        connect(Url::parse(&clusters_url).unwrap()).expect("Can't connect");
    thread::sleep(Duration::from_millis(200));

    thread::spawn(move || {
        let forecasts_url = format!("ws://127.0.0.1:{}/ws/publish/weather-forecasts", port);
        let (mut forecasts_socket, _resp) =
            connect(Url::parse(&forecasts_url).unwrap()).expect("Can't connect");
        forecasts_socket
            .write_message(Message::Text("{\"temperature\":".into()))
            .unwrap();
        for observation in scenario() {
            forecasts_socket
                .write_message(Message::Text(observation))
                .unwrap();
        }
        forecasts_socket.close(None).unwrap();
    });

    let mut result: Vec<String> = vec![];
    for _i in 0..6 {
        let m = clusters_socket.read_message().unwrap();
        result.push(m.into_text().unwrap());
    }
    assert_results(&result);
    let clusters: Vec<Option<u64>> = result
        .iter()
        .map(|r| serde_json::from_str::<Value>(r).unwrap()["cluster"].as_u64())
        .collect();
    assert_eq!(None, clusters[0]);
    assert_eq!(None, clusters[1]);
    assert_ne!(clusters[2], clusters[3]);
    assert_eq!(clusters[3], clusters[5]);
    clusters_socket.close(None).unwrap();
}

#[test]
fn test_close_flushes_published_payloads() {
    let bus = WsBus::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let url = format!("ws://127.0.0.1:{}/ws/subscribe/city-models", bus.local_addr().port());
    let (mut socket, _resp) = connect(Url::parse(&url).unwrap()).expect("Can't connect");
    thread::sleep(Duration::from_millis(200));

    for i in 0..3 {
        bus.publish("city-models", format!("{{\"snapshot\":{}}}", i).into_bytes(), JSON)
            .unwrap();
    }
    bus.close().unwrap();

    for i in 0..3 {
        let m = socket.read_message().unwrap();
        assert_eq!(format!("{{\"snapshot\":{}}}", i), m.into_text().unwrap());
    }
}
