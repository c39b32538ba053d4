use anyhow::{Context, Result};
use pusher_config::Config;
use pusher_statsd::MetricsClientConfig;

/// Initialize the logging system from the configuration.
pub fn init_logging(config: &Config) {
    pusher_log::init(config.logging());
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        pusher_log::info!("launching pusher without config file");
    } else {
        pusher_log::info!(
            "launching pusher from config {}",
            config.path().display()
        );
    }
    pusher_log::info!("  push interval: {}s", config.push_interval().as_secs());
    pusher_log::info!("  pushgateway: {}", config.pushgateway_url());
    match config.instance() {
        Some(instance) => pusher_log::info!("  instance: {instance}"),
        None => pusher_log::info!("  instance: <hostname>"),
    };
    pusher_log::info!("  split size: {}", config.split_size());
    pusher_log::info!("  log level: {}", config.logging().level);
    if config.dry_run() {
        pusher_log::info!("  dry run: batches are printed instead of pushed");
    }
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    pusher_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
    })
    .with_context(|| format!("could not report metrics to statsd at {host}"))?;

    Ok(())
}
