use std::fmt;

use smallvec::SmallVec;

/// Labels parsed from a label block, with values still in their escaped form.
pub(crate) type RawLabels<'a> = SmallVec<[(&'a str, &'a str); 8]>;

/// An ordered set of labels attached to every forwarded sample.
///
/// Label names are unique. Inserting an existing name replaces its value in place.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a label, returning the previous value of a label with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();

        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.0.push((name, value));
                None
            }
        }
    }

    /// Returns the value of a label.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of labels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for LabelSet
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut labels = Self::new();
        for (name, value) in iter {
            labels.insert(name, value);
        }
        labels
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        write_label_block(&mut buf, &[], self);
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

/// Returns `true` if `name` is a valid Prometheus label name.
///
/// ```
/// assert!(pusher_metrics::is_valid_label_name("dc_1"));
/// assert!(!pusher_metrics::is_valid_label_name("my-dc"));
/// ```
pub fn is_valid_label_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| *b == b' ' || *b == b'\t') {
        pos += 1;
    }
    pos
}

/// Parses a label block such as `{a="1", b="2"}` at the start of `block`.
///
/// Returns the labels and the offset just past the closing brace, or `None` if the block is
/// malformed.
pub(crate) fn parse_label_block(block: &str) -> Option<(RawLabels<'_>, usize)> {
    let bytes = block.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }

    let mut labels = RawLabels::new();
    let mut pos = 1;

    loop {
        pos = skip_whitespace(bytes, pos);
        if *bytes.get(pos)? == b'}' {
            return Some((labels, pos + 1));
        }

        let name_start = pos;
        while bytes
            .get(pos)
            .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let name = &block[name_start..pos];

        pos = skip_whitespace(bytes, pos);
        if *bytes.get(pos)? != b'=' {
            return None;
        }
        pos = skip_whitespace(bytes, pos + 1);
        if *bytes.get(pos)? != b'"' {
            return None;
        }

        let value_start = pos + 1;
        pos = value_start;
        loop {
            match *bytes.get(pos)? {
                b'\\' => pos += 2,
                b'"' => break,
                _ => pos += 1,
            }
        }
        labels.push((name, &block[value_start..pos]));

        pos = skip_whitespace(bytes, pos + 1);
        match *bytes.get(pos)? {
            b',' => pos += 1,
            b'}' => return Some((labels, pos + 1)),
            _ => return None,
        }
    }
}

/// Appends a label value in its escaped form.
pub(crate) fn escape_value(out: &mut Vec<u8>, value: &str) {
    for byte in value.bytes() {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'"' => out.extend_from_slice(b"\\\""),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(byte),
        }
    }
}

/// Writes a label block merging `extra` into `existing`.
///
/// Existing labels keep their position. Extra labels override existing labels of the same name
/// and are appended otherwise.
pub(crate) fn write_label_block(out: &mut Vec<u8>, existing: &[(&str, &str)], extra: &LabelSet) {
    out.push(b'{');

    let mut first = true;
    let mut separator = |out: &mut Vec<u8>| {
        if !std::mem::take(&mut first) {
            out.push(b',');
        }
    };

    for &(name, raw) in existing {
        separator(out);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b"=\"");
        match extra.get(name) {
            Some(value) => escape_value(out, value),
            None => out.extend_from_slice(raw.as_bytes()),
        }
        out.push(b'"');
    }

    for (name, value) in extra.iter() {
        if existing.iter().any(|(n, _)| *n == name) {
            continue;
        }
        separator(out);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape_value(out, value);
        out.push(b'"');
    }

    out.push(b'}');
}
