use std::path::PathBuf;

use clap::Parser;

use topic_provisioner::kafka::KafkaAdminGateway;
use topic_provisioner::{logger, provision, Shutdown};

/// Brings the topics of a Kafka cluster in line with a declared config.
#[derive(Debug, Parser)]
#[clap(name = "topic-provisioner", version)]
struct Opt {
    /// Location of the config file.
    #[clap(long, value_name = "PATH", default_value = "Provision.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    logger::init()?;

    let config = topic_provisioner::config::config(&opt.config)?;
    config.validate()?;

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupted, stopping after the current request");
        signal.shutdown();
    })?;

    let mut gateway = KafkaAdminGateway::from_config(&config);
    let report = provision(&config, &mut gateway, shutdown).await?;
    println!("{}", report);
    Ok(())
}
