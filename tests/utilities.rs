use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use regex::Regex;
use serde_json::{json, Value};

#[allow(unused)]
const OUT_PATTERN: &str = r#"^\{"city":"[A-Za-z ]+",("cluster":[0-9]+,)?"daytime":true,.*,"precipitation":\{"unitCode":"wmoUnit:percent","value":[0-9.]+\},.*"temperature":-?[0-9.]+,"units":"F","windspeed":"10 mph"\}$"#;

/// The two weather regimes the generated streams alternate between.
#[allow(unused)]
pub(crate) const REGIMES: [(f64, f64); 2] = [(35., 5.), (85., 60.)];

#[allow(unused)]
pub(crate) fn observation(city: &str, temperature: f64, precipitation: Option<f64>) -> String {
    json!({
        "city": city,
        "name": "This Afternoon",
        "summary": "Chance Showers And Thunderstorms",
        "temperature": temperature,
        "units": "F",
        "precipitation": {"unitCode": "wmoUnit:percent", "value": precipitation},
        "dewpoint": {"unitCode": "wmoUnit:degC", "value": 12.2},
        "humidity": {"unitCode": "wmoUnit:percent", "value": 71},
        "windspeed": "10 mph",
        "daytime": true,
        "start": "2023-06-01T13:00:00-05:00",
        "end": "2023-06-01T14:00:00-05:00"
    })
    .to_string()
}

/// The six observation stream: three cold and dry, then three warm and wet.
#[allow(unused)]
pub(crate) fn scenario() -> Vec<String> {
    [(10., 0.), (12., 0.), (11., 1.), (30., 5.), (31., 4.), (29., 6.)]
        .iter()
        .map(|(t, p)| observation("Springfield", *t, Some(*p)))
        .collect()
}

/// Alternates between the two regimes, with gaussian noise.
#[allow(unused)]
pub fn get_observation_iter(count: usize) -> impl Iterator<Item = (usize, String)> {
    let noise = Normal::new(0.0, 2.0).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(9787043385113690);
    (0..count).map(move |i| {
        let (t, p) = REGIMES[i % 2];
        let precipitation = (p + noise.sample(&mut rng)).max(0.);
        (i % 2, observation("Springfield", t + noise.sample(&mut rng), Some(precipitation)))
    })
}

#[allow(unused)]
pub(crate) fn assert_results(result: &[String]) {
    let re = Regex::new(OUT_PATTERN).unwrap();
    assert!(result.iter().all(|r| re.is_match(r)));
}

/// Checks the clusters found for a regime-alternating stream once the model has warmed up.
#[allow(unused)]
pub(crate) fn assert_regimes(regimes: &[usize], published: &[String], warmup: usize) {
    let clusters: Vec<Option<u64>> = published
        .iter()
        .map(|p| {
            let v: Value = serde_json::from_str(p).unwrap();
            v["cluster"].as_u64()
        })
        .collect();
    let assigned = clusters.iter().skip(warmup).filter(|c| c.is_some()).count();
    assert_eq!(published.len() - warmup, assigned);
    for regime in 0..2 {
        let labels: Vec<_> = regimes
            .iter()
            .zip(&clusters)
            .skip(warmup)
            .filter(|(r, _)| **r == regime)
            .map(|(_, c)| *c)
            .collect();
        assert!(labels.windows(2).all(|w| w[0] == w[1]), "{:?}", labels);
    }
}
