use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use pusher_config::{Config, ConfigError, ResourceConfig};
use pusher_log::LogError;
use pusher_metrics::{Buckets, LabelSet, RecordBuilder, Relabeler, RouteResolver};
use pusher_statsd::metric;
use url::Url;

use crate::dump::DumpFile;
use crate::http::{HttpClient, HttpError};
use crate::statsd::{PusherCounters, PusherHistograms, PusherTimers};

/// Resolves the `instance` label of pushes.
///
/// Falls back to the hostname, and to `localhost` if the hostname cannot be determined.
fn instance_name(config: &Config) -> String {
    if let Some(instance) = config.instance().filter(|i| !i.is_empty()) {
        return instance.to_owned();
    }

    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// Process-wide state shared by the cycles of all resources.
#[derive(Debug)]
pub struct CycleContext {
    config: Arc<Config>,
    client: ArcSwap<HttpClient>,
    labels: LabelSet,
    relabeler: Option<Relabeler>,
    instance: String,
    dump: DumpFile,
}

impl CycleContext {
    /// Creates the context, including the shared HTTP client.
    pub fn new(config: Arc<Config>) -> Result<Self, HttpError> {
        let client = HttpClient::new(&config)?;

        let labels = config.env_labels();
        if !labels.is_empty() {
            pusher_log::info!(%labels, "attaching environment labels");
        }

        let relabel = config.relabel();
        let relabeler = relabel
            .enabled
            .then(|| Relabeler::from_env(relabel.clone()));

        Ok(Self {
            instance: instance_name(&config),
            dump: DumpFile::new(config.dump_path()),
            client: ArcSwap::from_pointee(client),
            labels,
            relabeler,
            config,
        })
    }

    /// Returns the `instance` label of pushes.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Rebuilds the HTTP client, picking up a changed certificate file.
    ///
    /// On failure the previous client stays in use.
    pub fn reload(&self) {
        match HttpClient::new(&self.config) {
            Ok(client) => self.client.store(Arc::new(client)),
            Err(error) => pusher_log::error!(
                "could not rebuild http client, keeping the previous one: {}",
                LogError(&error)
            ),
        }
    }

    /// Runs the CPU bound part of a cycle: relabel, scan, build records and multiplex.
    fn process(&self, payload: Vec<u8>, routes: &RouteResolver, timestamp: i64) -> Buckets {
        let payload = match &self.relabeler {
            Some(relabeler) => relabeler.relabel(&payload),
            None => payload,
        };

        let scan = pusher_metrics::scan(&payload);
        let builder = RecordBuilder::new(
            routes,
            &self.labels,
            self.config.timestamp_mode(),
            timestamp,
        );

        pusher_metrics::mux(&payload, &scan, &builder)
    }
}

/// Summary of one cycle of a resource.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CycleReport {
    /// Name of the resource.
    pub resource: String,
    /// `true` if the exporter returned a payload.
    pub scraped: bool,
    /// Number of samples in the payload.
    pub samples: usize,
    /// Number of samples forwarded as raw fields.
    pub fallbacks: usize,
    /// Number of batches pushed, or printed in dry run mode.
    pub pushed: usize,
    /// Number of batches that failed to push.
    pub failed: usize,
}

/// A configured exporter and its current routes.
#[derive(Debug)]
pub struct Resource {
    config: ResourceConfig,
    routes: ArcSwap<RouteResolver>,
}

impl Resource {
    /// Creates a resource, loading its route map.
    pub fn new(config: ResourceConfig) -> Result<Self, ConfigError> {
        let routes = config.load_routes()?;

        Ok(Self {
            config,
            routes: ArcSwap::from_pointee(routes),
        })
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the configuration of this resource.
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Returns the current routes.
    pub fn routes(&self) -> Arc<RouteResolver> {
        self.routes.load_full()
    }

    /// Reloads the route map from disk.
    ///
    /// On failure the previous routes stay in use. Cycles that already started keep the routes
    /// they loaded.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let routes = self.config.load_routes()?;
        self.routes.store(Arc::new(routes));
        Ok(())
    }

    /// Scrapes the exporter, routes all samples and pushes them to their destinations.
    ///
    /// Errors are logged and reported in the returned [`CycleReport`], a cycle never fails.
    pub async fn cycle(self: Arc<Self>, context: Arc<CycleContext>) -> CycleReport {
        let cycle_start = Instant::now();
        let name = self.name();
        let client = context.client.load_full();

        let mut report = CycleReport {
            resource: name.to_owned(),
            ..Default::default()
        };

        let scrape_start = Instant::now();
        let scraped = client.scrape(&self.config.scrape_url).await;
        metric!(
            timer(PusherTimers::ScrapeDuration) = scrape_start.elapsed(),
            resource = name
        );

        let payload = match scraped {
            Ok(payload) => payload,
            Err(error) => {
                pusher_log::error!(
                    resource = name,
                    url = %self.config.scrape_url,
                    "failed to scrape resource: {}",
                    LogError(&error)
                );
                metric!(counter(PusherCounters::ScrapeFailed) += 1, resource = name);
                return report;
            }
        };

        report.scraped = true;
        metric!(
            histogram(PusherHistograms::ScrapeBytes) = payload.len() as u64,
            resource = name
        );

        let timestamp = chrono::Utc::now().timestamp_millis();
        let routes = self.routes();
        let processing = Arc::clone(&context);
        let processed = tokio::task::spawn_blocking(move || {
            processing.process(payload, &routes, timestamp)
        })
        .await;

        let buckets = match processed {
            Ok(buckets) => buckets,
            Err(error) => {
                pusher_log::error!(
                    resource = name,
                    "failed to process payload: {}",
                    LogError(&error)
                );
                return report;
            }
        };

        report.samples = buckets.samples;
        report.fallbacks = buckets.fallbacks;
        if buckets.fallbacks > 0 {
            pusher_log::warn!(
                resource = name,
                count = buckets.fallbacks,
                "forwarded unparsable samples verbatim"
            );
            metric!(
                counter(PusherCounters::RecordsFallback) += buckets.fallbacks as i64,
                resource = name
            );
        }

        let pushes = buckets
            .into_iter()
            .map(|(destination, bucket)| self.push_bucket(&context, &client, destination, bucket));

        for (pushed, failed) in futures::future::join_all(pushes).await {
            report.pushed += pushed;
            report.failed += failed;
        }

        metric!(
            timer(PusherTimers::CycleDuration) = cycle_start.elapsed(),
            resource = name
        );
        pusher_log::debug!(
            resource = name,
            samples = report.samples,
            pushed = report.pushed,
            failed = report.failed,
            "cycle complete"
        );

        report
    }

    /// Pushes the batches of one destination in order. Returns the number of pushed and failed
    /// batches.
    async fn push_bucket(
        &self,
        context: &CycleContext,
        client: &HttpClient,
        destination: String,
        bucket: Vec<u8>,
    ) -> (usize, usize) {
        let name = self.name();

        let lines = bucket
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty() && !line.starts_with(b"#"))
            .count();
        metric!(
            histogram(PusherHistograms::BucketLines) = lines as u64,
            resource = name,
            destination = &destination
        );

        let url = match self.config.push_url(&destination, context.instance()) {
            Ok(url) => url,
            Err(error) => {
                pusher_log::error!(
                    resource = name,
                    destination = %destination,
                    "invalid push url: {}",
                    LogError(&error)
                );
                return (0, 1);
            }
        };

        let mut pushed = 0;
        let mut failed = 0;

        for batch in pusher_metrics::split(&bucket, context.config.split_size()) {
            if context.config.dry_run() {
                print_batch(&url, &batch);
                pushed += 1;
                continue;
            }

            match client.push(&url, batch.to_vec()).await {
                Ok(()) => {
                    pushed += 1;
                    metric!(
                        counter(PusherCounters::PushBatches) += 1,
                        resource = name,
                        destination = &destination
                    );
                }
                Err(error) => {
                    failed += 1;
                    pusher_log::error!(
                        resource = name,
                        destination = %destination,
                        url = %url,
                        response = error.body(),
                        "failed to push batch: {}",
                        LogError(&error)
                    );
                    metric!(
                        counter(PusherCounters::PushFailed) += 1,
                        resource = name,
                        destination = &destination
                    );
                    context.dump.dump(&batch).await;
                }
            }
        }

        (pushed, failed)
    }
}

/// Writes a batch to stdout instead of pushing it.
fn print_batch(url: &Url, batch: &[u8]) {
    let mut stdout = io::stdout().lock();
    let result = writeln!(stdout, "# push {url}")
        .and_then(|()| stdout.write_all(batch))
        .and_then(|()| stdout.flush());

    if let Err(error) = result {
        pusher_log::error!("could not print batch: {}", LogError(&error));
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const TS: i64 = 1_600_000_000_000;

    fn context(yaml: &str) -> CycleContext {
        let config = Config::from_yaml_str(yaml).unwrap();
        CycleContext::new(Arc::new(config)).unwrap()
    }

    fn bucket(buckets: &Buckets, destination: &str) -> String {
        String::from_utf8(buckets.get(destination).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn test_instance_from_config() {
        let config = Config::from_yaml_str("pusher: {instance: web-1}").unwrap();
        assert_eq!(instance_name(&config), "web-1");

        let config = Config::from_yaml_str("pusher: {instance: ''}").unwrap();
        assert!(!instance_name(&config).is_empty());
    }

    #[test]
    fn test_process_routes_payload() {
        let context = context("pusher: {instance: web-1}");
        let routes = RouteResolver::parse("node_ test1\n", "test0").unwrap();

        let payload = b"# TYPE node_load1 gauge\nnode_load1 0.5\nup 1 1500000000000\n".to_vec();
        let buckets = context.process(payload, &routes, TS);

        insta::assert_snapshot!(bucket(&buckets, "test1"), @r###"
        # TYPE node_load1 gauge
        node_load1 0.5 1600000000000
        "###);
        insta::assert_snapshot!(bucket(&buckets, "test0"), @r###"
        # TYPE node_load1 gauge
        up 1 1500000000000
        "###);
    }

    #[test]
    fn test_process_relabels_first() {
        let context = context("relabel: {enabled: true}");
        let routes = RouteResolver::new(vec!["test0".to_owned()]);

        let payload = b"# TYPE rpc summary\nrpc{job=\"api\",quantile=\"0.5\"} 0.2 1500000000000\n";
        let buckets = context.process(payload.to_vec(), &routes, TS);

        // The relabel stage strips the exporter timestamp, so the collection timestamp is added.
        insta::assert_snapshot!(bucket(&buckets, "test0"), @r###"
        # TYPE rpc untyped
        rpc{original_job="api",quantile="0.5"} 0.2 1600000000000
        "###);
    }

    #[test]
    fn test_resource_reload_keeps_routes_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes");
        std::fs::write(&path, "node_ test1\n").unwrap();

        let config = Config::from_yaml_str(&format!(
            "resources: {{node: {{port: 9100, route_map: '{}'}}}}",
            path.display()
        ))
        .unwrap();
        let resource = Resource::new(config.resource("node").unwrap().unwrap()).unwrap();
        assert_eq!(resource.routes().route(b"node_load1"), ["test1"]);

        std::fs::write(&path, "node_ test2\n").unwrap();
        resource.reload().unwrap();
        assert_eq!(resource.routes().route(b"node_load1"), ["test2"]);

        std::fs::write(&path, "node_\n").unwrap();
        assert!(resource.reload().is_err());
        assert_eq!(resource.routes().route(b"node_load1"), ["test2"]);
    }
}
