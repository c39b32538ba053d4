use std::path::{Path, PathBuf};

use pusher_metrics::{RouteResolver, parse_destinations};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{ConfigError, ConfigErrorKind, ResourceDefaults};

/// Placeholder in push URLs that is replaced with the destination label.
pub const DESTINATION_PLACEHOLDER: &str = "{destination}";

/// Checks that a push URL template yields valid URLs.
pub(crate) fn check_push_template(template: &str) -> Result<(), ConfigError> {
    let url = template.replace(DESTINATION_PLACEHOLDER, "destination");
    let parsed =
        Url::parse(&url).map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidUrl))?;

    if parsed.cannot_be_a_base() {
        return Err(ConfigError::new(ConfigErrorKind::InvalidUrl));
    }

    Ok(())
}

/// A local exporter as written in the configuration file.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub(crate) struct Resource {
    /// Port of the exporter. Required.
    port: Option<u16>,
    /// Host of the exporter.
    ///
    /// Defaults to `localhost`.
    host: String,
    /// Scrapes the exporter via HTTPS.
    ssl: bool,
    /// Path of the metrics endpoint, without leading slash.
    path: String,
    /// Overrides the process-wide push URL template.
    pushgateway_url: Option<String>,
    /// Overrides the process-wide default destinations.
    default_route: Option<String>,
    /// Overrides the process-wide route map.
    route_map: Option<PathBuf>,
}

impl Default for Resource {
    fn default() -> Self {
        Resource {
            port: None,
            host: "localhost".to_owned(),
            ssl: false,
            path: "metrics".to_owned(),
            pushgateway_url: None,
            default_route: None,
            route_map: None,
        }
    }
}

impl Resource {
    pub(crate) fn resolve(
        &self,
        name: &str,
        defaults: &ResourceDefaults<'_>,
    ) -> Result<ResourceConfig, ConfigError> {
        let field = |key: &str| format!("resources.{name}.{key}");

        let port = self
            .port
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::MissingPort).field(field("port")))?;

        let scheme = if self.ssl { "https" } else { "http" };
        let path = self.path.trim_start_matches('/');
        let scrape_url = Url::parse(&format!("{scheme}://{}:{port}/{path}", self.host))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidUrl).field(field("host")))?;

        let pushgateway_url = self
            .pushgateway_url
            .as_deref()
            .unwrap_or(defaults.pushgateway_url)
            .to_owned();
        check_push_template(&pushgateway_url).map_err(|e| e.field(field("pushgateway_url")))?;

        let default_route = self
            .default_route
            .as_deref()
            .unwrap_or(defaults.default_route)
            .to_owned();
        if parse_destinations(&default_route).is_empty() {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field(field("default_route"))
            );
        }

        Ok(ResourceConfig {
            name: name.to_owned(),
            scrape_url,
            pushgateway_url,
            default_route,
            route_map: self
                .route_map
                .clone()
                .or_else(|| defaults.route_map.map(Path::to_path_buf)),
        })
    }
}

/// A resource with all process-wide defaults applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceConfig {
    /// Name of the resource, used as the `job` of pushes.
    pub name: String,
    /// Endpoint of the exporter.
    pub scrape_url: Url,
    /// Push URL template, may contain [`DESTINATION_PLACEHOLDER`].
    pub pushgateway_url: String,
    /// Comma separated destinations of unrouted metrics.
    pub default_route: String,
    /// Route map of this resource.
    pub route_map: Option<PathBuf>,
}

impl ResourceConfig {
    /// Returns the URL receiving the batches of `destination`.
    ///
    /// The URL is the push URL template with the destination substituted, followed by the
    /// `job/<name>/instance/<instance>` grouping key.
    ///
    /// ```
    /// let config = pusher_config::Config::from_yaml_str(
    ///     "pusher: {pushgateway_url: 'https://{destination}.example.org/metrics'}\n\
    ///      resources: {node: {port: 9100}}",
    /// )
    /// .unwrap();
    ///
    /// let node = config.resource("node").unwrap().unwrap();
    /// let url = node.push_url("eu", "web-1").unwrap();
    /// assert_eq!(url.as_str(), "https://eu.example.org/metrics/job/node/instance/web-1");
    /// ```
    pub fn push_url(&self, destination: &str, instance: &str) -> Result<Url, ConfigError> {
        let url = self
            .pushgateway_url
            .replace(DESTINATION_PLACEHOLDER, destination);
        let mut url =
            Url::parse(&url).map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidUrl))?;

        url.path_segments_mut()
            .map_err(|()| ConfigError::new(ConfigErrorKind::InvalidUrl))?
            .pop_if_empty()
            .extend(["job", &self.name, "instance", instance]);

        Ok(url)
    }

    /// Loads the route resolver of this resource.
    ///
    /// Without a route map, every metric goes to the default destinations.
    pub fn load_routes(&self) -> Result<RouteResolver, ConfigError> {
        match &self.route_map {
            Some(path) => RouteResolver::from_file(path, &self.default_route)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::RouteMap).file(path)),
            None => Ok(RouteResolver::new(parse_destinations(&self.default_route))),
        }
    }
}
