//! Optional rewriting of scraped payloads before they are scanned.
//!
//! Relabeling prepares payloads of exporters that collide with the labels a Pushgateway assigns
//! itself, attaches static labels taken from the environment and removes sample timestamps.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::labels::{
    LabelSet, RawLabels, is_valid_label_name, parse_label_block, write_label_block,
};

/// Configuration of the relabel stage.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelabelConfig {
    /// Runs the relabel stage on every scraped payload.
    ///
    /// Defaults to `false`.
    pub enabled: bool,
    /// Renames `instance` and `job` labels to `original_instance` and `original_job`.
    pub rename_reserved: bool,
    /// Environment variables starting with this prefix become static labels.
    ///
    /// The prefix is removed from the label name. Defaults to `log_field_`.
    pub label_prefix: String,
    /// Removes trailing integer timestamps from samples.
    pub strip_timestamps: bool,
    /// Declares summaries as untyped metrics.
    pub summary_as_untyped: bool,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rename_reserved: true,
            label_prefix: "log_field_".to_owned(),
            strip_timestamps: true,
            summary_as_untyped: true,
        }
    }
}

/// Collects static labels from environment variables starting with `prefix`.
///
/// ```
/// let vars = [("log_field_team".to_owned(), "core".to_owned())];
/// let labels = pusher_metrics::labels_with_prefix("log_field_", vars);
/// assert_eq!(labels.get("team"), Some("core"));
/// ```
pub fn labels_with_prefix<I>(prefix: &str, vars: I) -> LabelSet
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(prefix)?;
            is_valid_label_name(name).then(|| (name.to_owned(), value))
        })
        .collect()
}

/// Rewrites payloads according to a [`RelabelConfig`].
#[derive(Clone, Debug)]
pub struct Relabeler {
    config: RelabelConfig,
    labels: LabelSet,
}

impl Relabeler {
    /// Creates a relabeler adding `labels` to every sample.
    pub fn new(config: RelabelConfig, labels: LabelSet) -> Self {
        Self { config, labels }
    }

    /// Creates a relabeler with static labels from the process environment.
    pub fn from_env(config: RelabelConfig) -> Self {
        let labels = labels_with_prefix(&config.label_prefix, std::env::vars());
        if !labels.is_empty() {
            pusher_log::debug!(%labels, "relabeling with static labels");
        }
        Self::new(config, labels)
    }

    /// Returns the static labels.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Rewrites a payload. Blank lines are dropped, every other line is newline terminated.
    pub fn relabel(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + payload.len() / 4);

        for line in payload.split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match std::str::from_utf8(line) {
                Ok(line) if line.trim_start().starts_with('#') => self.comment(line, &mut out),
                Ok(line) => self.sample(line.trim_start(), &mut out),
                Err(_) => out.extend_from_slice(line),
            }

            out.push(b'\n');
        }

        out
    }

    fn comment(&self, line: &str, out: &mut Vec<u8>) {
        if self.config.summary_as_untyped {
            let tokens: SmallVec<[&str; 4]> = line.split_ascii_whitespace().collect();
            if let ["#", "TYPE", name, "summary"] = tokens.as_slice() {
                out.extend_from_slice(b"# TYPE ");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b" untyped");
                return;
            }
        }

        out.extend_from_slice(line.as_bytes());
    }

    fn sample(&self, line: &str, out: &mut Vec<u8>) {
        let name_len = line
            .find(|c: char| c == '{' || c.is_ascii_whitespace())
            .unwrap_or(line.len());
        let (name, mut rest) = line.split_at(name_len);

        let mut labels = None;
        let after_name = rest.trim_start_matches([' ', '\t']);
        if after_name.starts_with('{') {
            rest = after_name;
            let Some((parsed, end)) = parse_label_block(rest) else {
                out.extend_from_slice(line.as_bytes());
                return;
            };
            labels = Some(parsed);
            rest = &rest[end..];
        }

        out.extend_from_slice(name.as_bytes());

        if labels.is_some() || !self.labels.is_empty() {
            let mut labels: RawLabels<'_> = labels.unwrap_or_default();
            if self.config.rename_reserved {
                rename_reserved(&mut labels);
            }
            write_label_block(out, &labels, &self.labels);
        }

        let mut fields: SmallVec<[&str; 4]> = rest.split_ascii_whitespace().collect();
        if self.config.strip_timestamps {
            if let [.., value, timestamp] = fields.as_slice() {
                if value.parse::<f64>().is_ok() && timestamp.parse::<i64>().is_ok() {
                    fields.pop();
                }
            }
        }

        for field in fields {
            out.push(b' ');
            out.extend_from_slice(field.as_bytes());
        }
    }
}

/// Renames `instance` and `job` to their `original_` form.
///
/// A renamed label replaces an `original_` label the sample already carries.
fn rename_reserved(labels: &mut RawLabels<'_>) {
    for (reserved, renamed) in [("instance", "original_instance"), ("job", "original_job")] {
        if labels.iter().any(|(name, _)| *name == reserved) {
            labels.retain(|(name, _)| *name != renamed);
            for (name, _) in labels.iter_mut() {
                if *name == reserved {
                    *name = renamed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn relabel(config: RelabelConfig, labels: &[(&str, &str)], payload: &str) -> String {
        let labels = labels.iter().copied().collect();
        let relabeler = Relabeler::new(config, labels);
        String::from_utf8(relabeler.relabel(payload.as_bytes())).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config: RelabelConfig = serde_yaml::from_str("enabled: true").unwrap();
        assert_eq!(
            config,
            RelabelConfig {
                enabled: true,
                ..Default::default()
            }
        );
        assert_eq!(config.label_prefix, "log_field_");
    }

    #[test]
    fn test_rename_reserved() {
        let output = relabel(
            RelabelConfig::default(),
            &[],
            "up{instance=\"a\",job=\"node\",jobs=\"x\"} 1\n",
        );
        assert_eq!(
            output,
            "up{original_instance=\"a\",original_job=\"node\",jobs=\"x\"} 1\n"
        );
    }

    #[test]
    fn test_rename_reserved_collision() {
        let output = relabel(
            RelabelConfig::default(),
            &[],
            "up{original_instance=\"b\",instance=\"a\",original_job=\"j\"} 1\n",
        );
        assert_eq!(output, "up{original_instance=\"a\",original_job=\"j\"} 1\n");
    }

    #[test]
    fn test_labels_after_blank() {
        let output = relabel(
            RelabelConfig::default(),
            &[("team", "core")],
            "up {instance=\"a\"} 1 1500000000000\n",
        );
        assert_eq!(output, "up{original_instance=\"a\",team=\"core\"} 1\n");
    }

    #[test]
    fn test_static_labels() {
        let labels = [("team", "core"), ("host", "web-1")];
        let output = relabel(
            RelabelConfig::default(),
            &labels,
            "plain 1\nlabeled{a=\"1\"} 2\nempty{} 3\n",
        );
        insta::assert_snapshot!(output, @r###"
        plain{team="core",host="web-1"} 1
        labeled{a="1",team="core",host="web-1"} 2
        empty{team="core",host="web-1"} 3
        "###);
    }

    #[test]
    fn test_strip_timestamps() {
        let output = relabel(
            RelabelConfig::default(),
            &[],
            "a 1 1600000000000\nb 2\nc{x=\"y\"} 3.5 1600000000000\nd abc 1600000000000\n",
        );
        insta::assert_snapshot!(output, @r###"
        a 1
        b 2
        c{x="y"} 3.5
        d abc 1600000000000
        "###);
    }

    #[test]
    fn test_keep_timestamps() {
        let config = RelabelConfig {
            strip_timestamps: false,
            ..Default::default()
        };
        assert_eq!(relabel(config, &[], "a 1 1600000000000\n"), "a 1 1600000000000\n");
    }

    #[test]
    fn test_summary_as_untyped() {
        let payload = "# HELP rpc_duration_seconds A summary of RPC durations.\n\
            # TYPE rpc_duration_seconds summary\n\
            \n\
            rpc_duration_seconds{quantile=\"0.5\"} 0.2\n";
        let output = relabel(RelabelConfig::default(), &[], payload);
        insta::assert_snapshot!(output, @r###"
        # HELP rpc_duration_seconds A summary of RPC durations.
        # TYPE rpc_duration_seconds untyped
        rpc_duration_seconds{quantile="0.5"} 0.2
        "###);
    }

    #[test]
    fn test_malformed_labels_verbatim() {
        let output = relabel(RelabelConfig::default(), &[("a", "b")], "broken{x=1} 2 3\n");
        assert_eq!(output, "broken{x=1} 2 3\n");
    }

    #[test]
    fn test_labels_with_prefix() {
        let vars = [
            ("log_field_team", "core"),
            ("log_field_", "empty"),
            ("log_field_bad-name", "x"),
            ("PATH", "/usr/bin"),
        ]
        .map(|(k, v)| (k.to_owned(), v.to_owned()));

        let labels = labels_with_prefix("log_field_", vars);
        assert_eq!(labels.iter().collect::<Vec<_>>(), [("team", "core")]);
    }
}
