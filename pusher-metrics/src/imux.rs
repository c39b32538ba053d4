use std::collections::BTreeMap;

use crate::record::RecordBuilder;
use crate::scanner::Scan;

/// Per destination buckets of one scraped payload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Buckets {
    /// Rendered lines keyed by destination label.
    ///
    /// Every bucket starts with all comment lines of the payload, followed by one line per
    /// sample routed to it, each terminated by a newline.
    pub buckets: BTreeMap<String, Vec<u8>>,
    /// Number of samples forwarded as raw fields.
    pub fallbacks: usize,
    /// Number of samples that were multiplexed.
    pub samples: usize,
}

impl Buckets {
    /// Returns the bucket of a destination.
    pub fn get(&self, destination: &str) -> Option<&[u8]> {
        self.buckets.get(destination).map(Vec::as_slice)
    }

    /// Returns `true` if no sample was routed anywhere.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl IntoIterator for Buckets {
    type Item = (String, Vec<u8>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// Regroups the samples of a payload by destination.
///
/// Samples keep their source order within each bucket. Comments are only written into buckets
/// that receive at least one sample.
pub fn mux(payload: &[u8], scan: &Scan, builder: &RecordBuilder<'_>) -> Buckets {
    let mut comments = Vec::new();
    for comment in &scan.comments {
        comments.extend_from_slice(comment.line(payload));
        comments.push(b'\n');
    }

    let mut result = Buckets::default();

    for span in &scan.spans {
        let record = builder.build(span, payload);
        result.samples += 1;
        if record.fallback {
            result.fallbacks += 1;
        }

        for destination in record.destinations {
            let bucket = result
                .buckets
                .entry(destination.clone())
                .or_insert_with(|| comments.clone());
            bucket.extend_from_slice(&record.line);
            bucket.push(b'\n');
        }
    }

    result
}
