use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use pusher_config::{Config, OverridableConfig};

use crate::cliapp::make_app;
use crate::setup;

/// Reads an environment variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Collects configuration overrides from the command line and the environment.
///
/// Command line arguments take precedence over environment variables.
pub fn extract_config_args<F>(matches: Option<&ArgMatches>, lookup: F) -> OverridableConfig
where
    F: Fn(&str) -> Option<String>,
{
    let arg = |name: &str| matches.and_then(|m| m.get_one::<String>(name).cloned());

    OverridableConfig {
        pushgateway_url: lookup("PUSHGATEWAY_URL"),
        push_interval: lookup("PUSH_INTERVAL"),
        split_size: lookup("SPLIT_SIZE"),
        instance: lookup("INSTANCE_NAME"),
        username: lookup("PUSHGATEWAY_USER"),
        password: lookup("PUSHGATEWAY_PASSWORD"),
        password_file: lookup("PUSHGATEWAY_PASSWORD_FILE"),
        ca_cert: lookup("PROM_CERT"),
        http_timeout: arg("http_timeout"),
        dry_run: matches
            .map(|m| m.get_flag("dummy"))
            .filter(|dummy| *dummy),
        verbosity: matches.and_then(|m| m.get_one::<u8>("verbosity").copied()),
    }
}

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("/etc/prometheus-pusher"));

    let mut config = Config::from_path(&config_path)
        .with_context(|| format!("could not load config from {}", config_path.display()))?;

    let run_matches = match matches.subcommand() {
        Some(("run", run_matches)) => Some(run_matches),
        _ => None,
    };
    config.apply_override(extract_config_args(run_matches, env_var))?;

    setup::init_logging(&config);

    match matches.subcommand() {
        Some(("run", _)) => run(config),
        Some(("config", config_matches)) => manage_config(&config, config_matches),
        Some(("routes", routes_matches)) => show_routes(&config, routes_matches),
        _ => unreachable!(),
    }
}

pub fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => show_config(config),
        _ => unreachable!(),
    }
}

#[allow(clippy::print_stdout)]
pub fn show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml_string()?);
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn show_routes(config: &Config, matches: &ArgMatches) -> Result<()> {
    let (Some(name), Some(metric)) = (
        matches.get_one::<String>("resource"),
        matches.get_one::<String>("metric"),
    ) else {
        bail!("resource and metric are required");
    };

    let Some(resource) = config.resource(name)? else {
        bail!("unknown resource `{name}`");
    };

    for destination in resource.load_routes()?.route(metric.as_bytes()) {
        println!("{destination}");
    }

    Ok(())
}

pub fn run(config: Config) -> Result<()> {
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;
    pusher_server::run(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn env(name: &str) -> Option<String> {
        match name {
            "PUSHGATEWAY_URL" => Some("http://gateway:9091/metrics".to_owned()),
            "PUSH_INTERVAL" => Some("15".to_owned()),
            "PROM_CERT" => Some("/etc/ssl/ca.pem".to_owned()),
            _ => None,
        }
    }

    #[test]
    fn test_env_overrides() {
        let overrides = extract_config_args(None, env);

        assert_eq!(
            overrides.pushgateway_url.as_deref(),
            Some("http://gateway:9091/metrics")
        );
        assert_eq!(overrides.push_interval.as_deref(), Some("15"));
        assert_eq!(overrides.ca_cert.as_deref(), Some("/etc/ssl/ca.pem"));
        assert_eq!(overrides.split_size, None);
        assert_eq!(overrides.dry_run, None);
        assert_eq!(overrides.verbosity, None);
    }

    #[test]
    fn test_run_args() {
        let matches = make_app()
            .try_get_matches_from([
                "prometheus-pusher",
                "run",
                "--dummy",
                "--http-timeout",
                "5",
                "--verbosity",
                "2",
            ])
            .unwrap();

        let (_, run_matches) = matches.subcommand().unwrap();
        let overrides = extract_config_args(Some(run_matches), |_| None);

        assert_eq!(overrides.dry_run, Some(true));
        assert_eq!(overrides.http_timeout.as_deref(), Some("5"));
        assert_eq!(overrides.verbosity, Some(2));
    }

    #[test]
    fn test_config_is_global() {
        let matches = make_app()
            .try_get_matches_from(["prometheus-pusher", "config", "show", "-c", "/tmp/pusher.yml"])
            .unwrap();

        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("/tmp/pusher.yml"))
        );
    }

    #[test]
    fn test_routes_requires_arguments() {
        let result = make_app().try_get_matches_from(["prometheus-pusher", "routes", "node"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_app_is_valid() {
        make_app().debug_assert();
    }
}
