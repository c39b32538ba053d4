use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::labels::{LabelSet, RawLabels, parse_label_block, write_label_block};
use crate::routes::RouteResolver;
use crate::scanner::Span;

/// Decides when a sample is missing its timestamp.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Inspects the sample after its label block.
    ///
    /// A sample with only a value gets the collection timestamp. The value must be a float and an
    /// existing timestamp an integer, otherwise the raw fields are forwarded with the timestamp.
    #[default]
    LabelAware,

    /// Counts whitespace separated fields of the entire line.
    ///
    /// Lines with fewer fields get the collection timestamp. Spaces inside label values count as
    /// field separators.
    FieldCount(usize),
}

/// A sample ready to be multiplexed into destination buckets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetricRecord<'a> {
    /// The metric name.
    pub name: &'a [u8],
    /// The rendered line, without a trailing newline.
    pub line: Vec<u8>,
    /// The destinations of this sample.
    pub destinations: &'a [String],
    /// `true` if the sample could not be parsed and was forwarded as raw fields.
    pub fallback: bool,
}

/// The parts of a sample line.
struct Sample<'a> {
    name: &'a str,
    labels: Option<RawLabels<'a>>,
    block: &'a str,
    fields: SmallVec<[&'a str; 4]>,
}

impl<'a> Sample<'a> {
    fn parse(line: &'a str, name_len: usize) -> Option<Self> {
        let name = line.get(..name_len)?;
        let mut rest = line.get(name_len..)?;

        let mut labels = None;
        let mut block = "";
        let after_name = rest.trim_start_matches([' ', '\t']);
        if after_name.starts_with('{') {
            rest = after_name;
            let (parsed, end) = parse_label_block(rest)?;
            labels = Some(parsed);
            block = &rest[..end];
            rest = &rest[end..];
        }

        let fields: SmallVec<[&str; 4]> = rest.split_ascii_whitespace().collect();
        if fields.is_empty() {
            return None;
        }

        Some(Self {
            name,
            labels,
            block,
            fields,
        })
    }
}

/// Builds [`MetricRecord`]s from scanned spans.
///
/// A builder is bound to one cycle: all records share the same collection timestamp.
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    resolver: &'a RouteResolver,
    labels: &'a LabelSet,
    mode: TimestampMode,
    timestamp: String,
}

impl<'a> RecordBuilder<'a> {
    /// Creates a builder for a cycle collected at `timestamp` milliseconds since the epoch.
    pub fn new(
        resolver: &'a RouteResolver,
        labels: &'a LabelSet,
        mode: TimestampMode,
        timestamp: i64,
    ) -> Self {
        Self {
            resolver,
            labels,
            mode,
            timestamp: timestamp.to_string(),
        }
    }

    /// Returns the collection timestamp as it is rendered into samples.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Builds the record for the sample at `span`.
    pub fn build<'p>(&self, span: &Span, payload: &'p [u8]) -> MetricRecord<'p>
    where
        'a: 'p,
    {
        let name = span.name(payload);
        let line = span.line(payload);

        let rendered = std::str::from_utf8(line)
            .ok()
            .and_then(|line| self.render(line, name.len()));

        let (line, fallback) = match rendered {
            Some(line) => (line, false),
            None => {
                pusher_log::trace!(
                    metric = %String::from_utf8_lossy(name),
                    "forwarding unparsable sample as raw fields"
                );
                (self.fallback(line), true)
            }
        };

        MetricRecord {
            name,
            line,
            destinations: self.resolver.route(name),
            fallback,
        }
    }

    fn timestamp_missing(&self, line: &str, sample: &Sample<'_>) -> Option<bool> {
        match self.mode {
            TimestampMode::LabelAware => match sample.fields.as_slice() {
                [value] => {
                    value.parse::<f64>().ok()?;
                    Some(true)
                }
                [value, timestamp] => {
                    value.parse::<f64>().ok()?;
                    timestamp.parse::<i64>().ok()?;
                    Some(false)
                }
                _ => None,
            },
            TimestampMode::FieldCount(count) => {
                Some(line.split_ascii_whitespace().count() < count)
            }
        }
    }

    fn render(&self, line: &str, name_len: usize) -> Option<Vec<u8>> {
        let sample = Sample::parse(line, name_len)?;
        let missing = self.timestamp_missing(line, &sample)?;

        let mut out = Vec::with_capacity(line.len() + self.timestamp.len() + 16);
        out.extend_from_slice(sample.name.as_bytes());

        match (&sample.labels, self.labels.is_empty()) {
            (Some(_), true) => out.extend_from_slice(sample.block.as_bytes()),
            (Some(existing), false) => write_label_block(&mut out, existing, self.labels),
            (None, false) => write_label_block(&mut out, &[], self.labels),
            (None, true) => (),
        }

        for field in &sample.fields {
            out.push(b' ');
            out.extend_from_slice(field.as_bytes());
        }

        if missing {
            out.push(b' ');
            out.extend_from_slice(self.timestamp.as_bytes());
        }

        Some(out)
    }

    /// Joins the whitespace separated fields of a line and appends the timestamp.
    fn fallback(&self, line: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(line.len() + self.timestamp.len() + 1);
        for field in line
            .split(u8::is_ascii_whitespace)
            .filter(|field| !field.is_empty())
        {
            out.extend_from_slice(field);
            out.push(b' ');
        }
        out.extend_from_slice(self.timestamp.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::scanner::scan;

    use super::*;

    const TS: i64 = 1_600_000_000_123;

    fn build_all(payload: &[u8], labels: &LabelSet, mode: TimestampMode) -> Vec<(String, bool)> {
        let resolver = RouteResolver::new(vec!["A".to_owned()]);
        let builder = RecordBuilder::new(&resolver, labels, mode, TS);

        scan(payload)
            .spans
            .iter()
            .map(|span| {
                let record = builder.build(span, payload);
                (String::from_utf8(record.line).unwrap(), record.fallback)
            })
            .collect()
    }

    fn lines(payload: &[u8], labels: &LabelSet, mode: TimestampMode) -> Vec<String> {
        build_all(payload, labels, mode)
            .into_iter()
            .map(|(line, _)| line)
            .collect()
    }

    #[test]
    fn test_appends_missing_timestamp() {
        let payload = b"foo_bar 20.1\nbin_bar{existing=\"E1\"} 20.3\n";
        let lines = lines(payload, &LabelSet::new(), TimestampMode::LabelAware);
        assert_eq!(
            lines,
            [
                "foo_bar 20.1 1600000000123",
                "bin_bar{existing=\"E1\"} 20.3 1600000000123",
            ]
        );
    }

    #[test]
    fn test_keeps_existing_timestamp() {
        let payload = b"up 1 1500000000000\nspaced{path=\"/a b\"}   2   1500000000000\n";
        let lines = lines(payload, &LabelSet::new(), TimestampMode::LabelAware);
        assert_eq!(
            lines,
            ["up 1 1500000000000", "spaced{path=\"/a b\"} 2 1500000000000"]
        );
    }

    #[test]
    fn test_special_values() {
        let payload = b"a NaN\nb +Inf\nc -Inf\nd 1.5e-7\n";
        let lines = lines(payload, &LabelSet::new(), TimestampMode::LabelAware);
        assert_eq!(
            lines,
            [
                "a NaN 1600000000123",
                "b +Inf 1600000000123",
                "c -Inf 1600000000123",
                "d 1.5e-7 1600000000123",
            ]
        );
    }

    #[test]
    fn test_merges_labels() {
        let labels: LabelSet = [("dc", "ams"), ("existing", "override")]
            .into_iter()
            .collect();
        let payload = b"foo_bar 20.1\nbin_bar{existing=\"E1\",b=\"2\"} 20.3 5\n";

        let lines = lines(payload, &labels, TimestampMode::LabelAware);
        assert_eq!(
            lines,
            [
                "foo_bar{dc=\"ams\",existing=\"override\"} 20.1 1600000000123",
                "bin_bar{existing=\"override\",b=\"2\",dc=\"ams\"} 20.3 5",
            ]
        );
    }

    #[test]
    fn test_merges_into_empty_block() {
        let labels: LabelSet = [("dc", "ams")].into_iter().collect();
        let lines = lines(b"foo{} 1\n", &labels, TimestampMode::LabelAware);
        assert_eq!(lines, ["foo{dc=\"ams\"} 1 1600000000123"]);
    }

    #[test]
    fn test_fallback() {
        let payload = b"no_value\nbad_value abc\nbad_ts 1 abc\nbroken{a=\"1\" 2\ntoo many fields here\n";
        let records = build_all(payload, &LabelSet::new(), TimestampMode::LabelAware);
        assert_eq!(
            records,
            [
                ("no_value 1600000000123".to_owned(), true),
                ("bad_value abc 1600000000123".to_owned(), true),
                ("bad_ts 1 abc 1600000000123".to_owned(), true),
                ("broken{a=\"1\" 2 1600000000123".to_owned(), true),
                ("too many fields here 1600000000123".to_owned(), true),
            ]
        );
    }

    #[test]
    fn test_fallback_invalid_utf8() {
        let resolver = RouteResolver::new(vec!["A".to_owned()]);
        let labels = LabelSet::new();
        let builder = RecordBuilder::new(&resolver, &labels, TimestampMode::LabelAware, TS);

        let payload = b"bytes{a=\"\xff\"}   1\n";
        let result = scan(payload);
        assert_eq!(result.spans.len(), 1);

        let record = builder.build(&result.spans[0], payload);
        assert!(record.fallback);
        assert_eq!(record.line, b"bytes{a=\"\xff\"} 1 1600000000123".as_slice());
    }

    #[test]
    fn test_merges_labels_after_blank() {
        let mut labels = LabelSet::new();
        labels.insert("dc", "ams");

        let payload = b"a {x=\"1\"} 1\nb\t{} 2 1500000000000\n";
        let records = build_all(payload, &labels, TimestampMode::LabelAware);
        assert_eq!(
            records,
            [
                ("a{x=\"1\",dc=\"ams\"} 1 1600000000123".to_owned(), false),
                ("b{dc=\"ams\"} 2 1500000000000".to_owned(), false),
            ]
        );
    }

    #[test]
    fn test_field_count_mode() {
        let payload = b"foo 1\nbar{a=\"x y\"} 2\nbaz 3 1500000000000\n";
        let lines = lines(payload, &LabelSet::new(), TimestampMode::FieldCount(3));
        assert_eq!(
            lines,
            [
                "foo 1 1600000000123",
                // The space inside the label value counts as a field.
                "bar{a=\"x y\"} 2",
                "baz 3 1500000000000",
            ]
        );
    }

    #[test]
    fn test_destinations() {
        let resolver = RouteResolver::parse("node_memory test4,test-bck\n", "test0").unwrap();
        let labels = LabelSet::new();
        let builder = RecordBuilder::new(&resolver, &labels, TimestampMode::default(), TS);

        let payload = b"node_memory_free 1\nother 2\n";
        let scan = scan(payload);

        let first = builder.build(&scan.spans[0], payload);
        assert_eq!(first.name, b"node_memory_free");
        assert_eq!(first.destinations, ["test4", "test-bck"]);

        let second = builder.build(&scan.spans[1], payload);
        assert_eq!(second.destinations, ["test0"]);
    }
}
