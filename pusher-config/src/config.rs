use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pusher_log::{Level, LogConfig};
use pusher_metrics::{LabelSet, RelabelConfig, TimestampMode, is_valid_label_name};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::resource::{Resource, ResourceConfig, check_push_template};

/// Defines the source of a config error
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field, or a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    pub(crate) fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    pub(crate) fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(cause.into()),
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &str) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    pub(crate) fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    pub(crate) fn field(mut self, name: impl Into<String>) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.into());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// A resource does not declare the port of its exporter.
    #[error("resource is missing a port")]
    MissingPort,
    /// A scrape or push URL is malformed.
    #[error("invalid url")]
    InvalidUrl,
    /// A route map could not be read or contains a malformed route.
    #[error("could not load route map")]
    RouteMap,
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The push URL template of the Pushgateway.
    pub pushgateway_url: Option<String>,
    /// The push interval in seconds.
    pub push_interval: Option<String>,
    /// The maximum number of samples per push.
    pub split_size: Option<String>,
    /// The instance label of all pushes.
    pub instance: Option<String>,
    /// The basic auth user for pushes.
    pub username: Option<String>,
    /// The basic auth password for pushes.
    pub password: Option<String>,
    /// A file containing the basic auth password.
    pub password_file: Option<String>,
    /// A PEM file with additional trusted certificates.
    pub ca_cert: Option<String>,
    /// The timeout of HTTP requests in seconds.
    pub http_timeout: Option<String>,
    /// Print batches instead of pushing them.
    pub dry_run: Option<bool>,
    /// Numeric verbosity of the log output.
    pub verbosity: Option<u8>,
}

/// Controls the pusher's scrape and push behavior.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Pusher {
    /// URL of the Pushgateway, may contain the `{destination}` placeholder.
    ///
    /// Defaults to `http://localhost:9091/metrics`.
    pushgateway_url: String,
    /// Seconds between two cycles.
    push_interval: u64,
    /// Route map shared by all resources without their own.
    route_map: Option<PathBuf>,
    /// Comma separated destinations of unrouted metrics.
    default_route: String,
    /// Maximum number of samples per push.
    split_size: usize,
    /// When to append the collection timestamp to samples.
    #[serde(with = "serde_yaml::with::singleton_map")]
    timestamp_mode: TimestampMode,
    /// Value of the `instance` label of pushes.
    ///
    /// Defaults to the hostname.
    instance: Option<String>,
    /// File receiving the body of failed pushes.
    dump_path: PathBuf,
    /// Prints batches to stdout instead of pushing them.
    dry_run: bool,
    /// Seconds to wait for blocking work after a graceful shutdown.
    shutdown_timeout: u64,
}

impl Default for Pusher {
    fn default() -> Self {
        Pusher {
            pushgateway_url: "http://localhost:9091/metrics".to_owned(),
            push_interval: 60,
            route_map: None,
            default_route: "default".to_owned(),
            split_size: 1000,
            timestamp_mode: TimestampMode::default(),
            instance: None,
            dump_path: PathBuf::from("/tmp/metrics_error_dump.txt"),
            dry_run: false,
            shutdown_timeout: 10,
        }
    }
}

/// Basic auth credentials for pushes.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct HttpAuth {
    username: Option<String>,
    password: Option<String>,
    password_file: Option<PathBuf>,
}

/// Controls the HTTP client.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Http {
    /// Timeout of scrape and push requests in seconds.
    ///
    /// Covers the entire request including reading the response body.
    timeout: u64,
    /// PEM file with certificates to trust in addition to the system roots.
    ca_cert: Option<PathBuf>,
    /// Basic auth for pushes.
    auth: HttpAuth,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            timeout: 30,
            ca_cert: None,
            auth: HttpAuth::default(),
        }
    }
}

/// Names of environment variables attached as labels to every sample.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct EnvLabels {
    default: Vec<String>,
    service: Vec<String>,
}

/// Controls internal metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"prometheus_pusher"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "prometheus_pusher".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    pusher: Pusher,
    #[serde(default)]
    http: Http,
    #[serde(default)]
    env_labels: EnvLabels,
    #[serde(default)]
    relabel: RelabelConfig,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    resources: BTreeMap<String, Resource>,
}

/// The password of [`BasicAuth`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Password {
    /// No password.
    None,
    /// A literal password.
    Plain(String),
    /// A file that is read on every push.
    File(PathBuf),
}

/// Basic auth credentials for pushes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicAuth {
    /// The user name.
    pub username: String,
    /// The password.
    pub password: Password,
}

fn is_config_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext == "yml" || ext == "yaml")
}

/// Reads one YAML file into a mapping. Empty files yield an empty mapping.
fn load_file(path: &Path) -> Result<Mapping, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;

    match serde_yaml::from_str(&contents) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(ConfigError::new(ConfigErrorKind::BadYaml).file(path)),
        Err(e) => Err(ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path)),
    }
}

/// Merges `next` into `base`.
///
/// Later files win per top-level key, except for `resources`, which are merged per resource.
fn merge(base: &mut Mapping, next: Mapping) {
    for (key, value) in next {
        if let (Some("resources"), Value::Mapping(resources)) = (key.as_str(), &value)
            && let Some(Value::Mapping(existing)) = base.get_mut(&key)
        {
            existing.extend(resources.clone());
            continue;
        }

        base.insert(key, value);
    }
}

/// Parses a numeric override.
fn parse_override<T>(value: &str, field: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .map_err(|err| ConfigError::for_field(err, field))
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a file or a folder.
    ///
    /// When `path` is a folder, all `*.yml` and `*.yaml` files within it are read in the order of
    /// their names. Later files override top-level sections of earlier files, resources are
    /// merged by name.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let files = if path.is_dir() {
            let entries = fs::read_dir(&path)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

            let mut files = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| {
                    ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path)
                })?;
                if is_config_file(&entry.path()) {
                    files.push(entry.path());
                }
            }
            files.sort();

            if files.is_empty() {
                return Err(ConfigError::new(ConfigErrorKind::CouldNotOpenFile).file(&path));
            }
            files
        } else {
            vec![path.clone()]
        };

        let mut merged = Mapping::new();
        for file in &files {
            pusher_log::debug!(path = %file.display(), "loading config file");
            merge(&mut merged, load_file(file)?);
        }

        let values = serde_yaml::from_value(Value::Mapping(merged))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))?;

        let config = Config { values, path };
        config.validate()?;
        Ok(config)
    }

    /// Creates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let values = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml))?;

        let config = Config {
            values,
            path: PathBuf::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let pusher = &mut self.values.pusher;

        if let Some(url) = overrides.pushgateway_url {
            check_push_template(&url).map_err(|e| e.field("pushgateway_url"))?;
            pusher.pushgateway_url = url;
        }

        if let Some(interval) = overrides.push_interval {
            pusher.push_interval = parse_override(&interval, "push_interval")?;
        }

        if let Some(split_size) = overrides.split_size {
            pusher.split_size = parse_override(&split_size, "split_size")?;
        }

        if let Some(instance) = overrides.instance {
            pusher.instance = Some(instance);
        }

        if let Some(dry_run) = overrides.dry_run {
            pusher.dry_run = dry_run;
        }

        let http = &mut self.values.http;

        if let Some(timeout) = overrides.http_timeout {
            http.timeout = parse_override(&timeout, "http_timeout")?;
        }

        if let Some(ca_cert) = overrides.ca_cert {
            http.ca_cert = Some(PathBuf::from(ca_cert));
        }

        if let Some(username) = overrides.username {
            http.auth.username = Some(username);
        }

        if let Some(password) = overrides.password {
            http.auth.password = Some(password);
        }

        if let Some(password_file) = overrides.password_file {
            http.auth.password_file = Some(PathBuf::from(password_file));
        }

        if let Some(verbosity) = overrides.verbosity {
            self.values.logging.level = Level::from_verbosity(verbosity);
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks values that cannot be expressed in the types of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pusher = &self.values.pusher;

        if pusher.push_interval == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("push_interval"));
        }

        if self.values.http.timeout == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("http.timeout"));
        }

        check_push_template(&pusher.pushgateway_url)
            .map_err(|e| e.field("pusher.pushgateway_url"))?;

        let env_labels = &self.values.env_labels;
        for (field, names) in [
            ("env_labels.default", &env_labels.default),
            ("env_labels.service", &env_labels.service),
        ] {
            if names
                .iter()
                .any(|name| !is_valid_label_name(&name.to_lowercase()))
            {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field(field));
            }
        }

        self.resources().map(|_| ())
    }

    /// Returns the path of the config file or folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the Pushgateway URL template.
    pub fn pushgateway_url(&self) -> &str {
        &self.values.pusher.pushgateway_url
    }

    /// Returns the interval between two cycles.
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.values.pusher.push_interval)
    }

    /// Returns the maximum number of samples per push.
    pub fn split_size(&self) -> usize {
        self.values.pusher.split_size
    }

    /// Returns when samples get the collection timestamp.
    pub fn timestamp_mode(&self) -> TimestampMode {
        self.values.pusher.timestamp_mode
    }

    /// Returns the configured instance label, if any.
    ///
    /// Callers fall back to the hostname.
    pub fn instance(&self) -> Option<&str> {
        self.values.pusher.instance.as_deref()
    }

    /// Returns the file receiving failed push bodies.
    pub fn dump_path(&self) -> &Path {
        &self.values.pusher.dump_path
    }

    /// Returns `true` if batches are printed instead of pushed.
    pub fn dry_run(&self) -> bool {
        self.values.pusher.dry_run
    }

    /// Returns the time to wait for blocking work after a graceful shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.pusher.shutdown_timeout)
    }

    /// Returns the timeout of HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout)
    }

    /// Returns the path of additional trusted certificates.
    pub fn http_ca_cert(&self) -> Option<&Path> {
        self.values.http.ca_cert.as_deref()
    }

    /// Returns the basic auth credentials for pushes.
    ///
    /// A literal password takes precedence over a password file.
    pub fn http_auth(&self) -> Option<BasicAuth> {
        let auth = &self.values.http.auth;
        let username = auth.username.clone().filter(|u| !u.is_empty())?;

        let password = match (&auth.password, &auth.password_file) {
            (Some(password), _) if !password.is_empty() => Password::Plain(password.clone()),
            (_, Some(file)) => Password::File(file.clone()),
            _ => Password::None,
        };

        Some(BasicAuth { username, password })
    }

    /// Returns the labels attached to every sample, read from the environment.
    pub fn env_labels(&self) -> LabelSet {
        self.env_labels_with(|name| std::env::var(name).ok())
    }

    /// Returns the labels attached to every sample, looking up variables with `lookup`.
    ///
    /// Each variable that is set to a non-empty value yields a label with the lowercased
    /// variable name.
    pub fn env_labels_with<F>(&self, lookup: F) -> LabelSet
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_labels = &self.values.env_labels;
        let mut labels = LabelSet::new();

        for name in env_labels.default.iter().chain(&env_labels.service) {
            if labels.get(&name.to_lowercase()).is_some() {
                continue;
            }
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                labels.insert(name.to_lowercase(), value);
            }
        }

        labels
    }

    /// Returns the configuration of the relabel stage.
    pub fn relabel(&self) -> &RelabelConfig {
        &self.values.relabel
    }

    /// Returns logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server, if configured.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Resolves all resources, applying process-wide defaults.
    pub fn resources(&self) -> Result<Vec<ResourceConfig>, ConfigError> {
        self.values
            .resources
            .iter()
            .map(|(name, resource)| resource.resolve(name, &self.values.pusher.as_defaults()))
            .collect()
    }

    /// Resolves a single resource by name.
    pub fn resource(&self, name: &str) -> Result<Option<ResourceConfig>, ConfigError> {
        self.values
            .resources
            .get(name)
            .map(|resource| resource.resolve(name, &self.values.pusher.as_defaults()))
            .transpose()
    }
}

/// Process-wide values inherited by resources.
pub(crate) struct ResourceDefaults<'a> {
    pub pushgateway_url: &'a str,
    pub default_route: &'a str,
    pub route_map: Option<&'a Path>,
}

impl Pusher {
    fn as_defaults(&self) -> ResourceDefaults<'_> {
        ResourceDefaults {
            pushgateway_url: &self.pushgateway_url,
            default_route: &self.default_route,
            route_map: self.route_map.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const MINIMAL: &str = r#"
resources:
  node:
    port: 9100
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.pushgateway_url(), "http://localhost:9091/metrics");
        assert_eq!(config.push_interval(), Duration::from_secs(60));
        assert_eq!(config.split_size(), 1000);
        assert_eq!(config.timestamp_mode(), TimestampMode::LabelAware);
        assert_eq!(config.instance(), None);
        assert_eq!(config.dump_path(), Path::new("/tmp/metrics_error_dump.txt"));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.http_auth(), None);
        assert!(!config.dry_run());
        assert!(!config.relabel().enabled);
        assert_eq!(config.metrics_prefix(), "prometheus_pusher");
    }

    #[test]
    fn test_timestamp_mode() {
        let config = Config::from_yaml_str(
            r#"
pusher:
  timestamp_mode:
    field_count: 3
"#,
        )
        .unwrap();
        assert_eq!(config.timestamp_mode(), TimestampMode::FieldCount(3));

        let config = Config::from_yaml_str("pusher:\n  timestamp_mode: label_aware\n").unwrap();
        assert_eq!(config.timestamp_mode(), TimestampMode::LabelAware);
    }

    #[test]
    fn test_missing_port() {
        let error = Config::from_yaml_str("resources:\n  node:\n    host: example.org\n")
            .unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::MissingPort);
        assert_eq!(
            error.to_string(),
            "resource is missing a port (field resources.node.port)"
        );
    }

    #[test]
    fn test_bad_yaml() {
        let error = Config::from_yaml_str("pusher: [").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_invalid_push_url() {
        let error = Config::from_yaml_str("pusher:\n  pushgateway_url: not a url\n").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidUrl);
    }

    #[test]
    fn test_zero_interval() {
        let error = Config::from_yaml_str("pusher:\n  push_interval: 0\n").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_yaml_str(MINIMAL).unwrap();
        config
            .apply_override(OverridableConfig {
                pushgateway_url: Some("https://{destination}.example.org/metrics".to_owned()),
                push_interval: Some("15".to_owned()),
                split_size: Some("500".to_owned()),
                instance: Some("web-1".to_owned()),
                username: Some("pusher".to_owned()),
                password_file: Some("/run/secrets/password".to_owned()),
                http_timeout: Some("5".to_owned()),
                dry_run: Some(true),
                verbosity: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            config.pushgateway_url(),
            "https://{destination}.example.org/metrics"
        );
        assert_eq!(config.push_interval(), Duration::from_secs(15));
        assert_eq!(config.split_size(), 500);
        assert_eq!(config.instance(), Some("web-1"));
        assert_eq!(config.http_timeout(), Duration::from_secs(5));
        assert!(config.dry_run());
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(
            config.http_auth(),
            Some(BasicAuth {
                username: "pusher".to_owned(),
                password: Password::File(PathBuf::from("/run/secrets/password")),
            })
        );
    }

    #[test]
    fn test_apply_override_invalid() {
        let mut config = Config::from_yaml_str(MINIMAL).unwrap();
        let error = config
            .apply_override(OverridableConfig {
                push_interval: Some("soon".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field push_interval)");
    }

    #[test]
    fn test_password_precedence() {
        let config = Config::from_yaml_str(
            r#"
http:
  auth:
    username: pusher
    password: secret
    password_file: /run/secrets/password
"#,
        )
        .unwrap();

        assert_eq!(
            config.http_auth().map(|auth| auth.password),
            Some(Password::Plain("secret".to_owned()))
        );
    }

    #[test]
    fn test_env_labels() {
        let config = Config::from_yaml_str(
            r#"
env_labels:
  default: [DC, ENVIRONMENT, UNSET]
  service: [SERVICE, DC, EMPTY]
"#,
        )
        .unwrap();

        let labels = config.env_labels_with(|name| match name {
            "DC" => Some("ams".to_owned()),
            "ENVIRONMENT" => Some("production".to_owned()),
            "SERVICE" => Some("api".to_owned()),
            "EMPTY" => Some(String::new()),
            _ => None,
        });

        assert_eq!(labels.to_string(), r#"{dc="ams",environment="production",service="api"}"#);
    }

    #[test]
    fn test_invalid_env_label_name() {
        let error = Config::from_yaml_str("env_labels:\n  service: [SERVICE, MY-DC]\n").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(
            error.to_string(),
            "invalid config value (field env_labels.service)"
        );
    }

    #[test]
    fn test_from_dir_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("00-base.yml"),
            "pusher:\n  push_interval: 30\nresources:\n  node:\n    port: 9100\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("10-app.yaml"),
            "resources:\n  app:\n    port: 8080\n    path: prometheus\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a config").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.push_interval(), Duration::from_secs(30));

        let names: Vec<_> = config
            .resources()
            .unwrap()
            .into_iter()
            .map(|resource| resource.name)
            .collect();
        assert_eq!(names, ["app", "node"]);
    }

    #[test]
    fn test_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
    }

    #[test]
    fn test_from_missing_file() {
        let error = Config::from_path("/nonexistent/config.yml").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert_eq!(
            error.to_string(),
            "could not open config file (file /nonexistent/config.yml)"
        );
    }

    #[test]
    fn test_merge() {
        let mut base: Mapping =
            serde_yaml::from_str("pusher: {split_size: 5}\nresources: {a: {port: 1}}").unwrap();
        let next: Mapping =
            serde_yaml::from_str("pusher: {push_interval: 5}\nresources: {b: {port: 2}}").unwrap();
        merge(&mut base, next);

        insta::assert_snapshot!(serde_yaml::to_string(&base).unwrap(), @r###"
        pusher:
          push_interval: 5
        resources:
          a:
            port: 1
          b:
            port: 2
        "###);
    }
}
