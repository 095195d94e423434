use std::error::Error;

use clap::Parser;
use fluent_weather::{
    config::Config, partition::PartitionedModels, processor::EventProcessor, service::WsBus,
};
use log::info;
use simple_logger::SimpleLogger;

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::parse();
    SimpleLogger::new().with_level(config.log_level()).init()?;

    let kmeans = config.kmeans();
    let models = PartitionedModels::new(kmeans, config.partitioning())?;
    let bus = WsBus::bind(config.listen_address()?)?;
    info!(
        "k = {}, halflife = {}, chunk size = {}, spawn radius = {}, seed = {}, {:?}",
        kmeans.k,
        kmeans.halflife,
        kmeans.chunk_size,
        kmeans.spawn_radius,
        kmeans.seed,
        config.partitioning()
    );

    let mut processor = EventProcessor::new(&bus, config.topics(), models);
    let shutdown = processor.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        shutdown.request();
    })?;
    let stats = processor.run()?;
    drop(processor);
    bus.close()?;
    info!("shut down cleanly: {}", stats);
    Ok(())
}
