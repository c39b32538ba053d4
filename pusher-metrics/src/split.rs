use std::borrow::Cow;
use std::iter::FusedIterator;

/// Splits a bucket into batches of bounded size.
///
/// Every batch holds at most `max_lines` data lines. Comment lines and blank lines are carried
/// along without counting towards the limit. Lines are never split and every data or comment line
/// of the bucket is yielded exactly once, in order. Trailing blank lines are dropped.
///
/// Batches borrow from the bucket where possible. Only a final line without a trailing newline
/// requires a copy.
///
/// # Example
///
/// ```
/// let batches: Vec<_> = pusher_metrics::split(b"# TYPE a gauge\na 1\na 2\n", 1).collect();
/// assert_eq!(&batches[0][..], b"# TYPE a gauge\na 1\n");
/// assert_eq!(&batches[1][..], b"a 2\n");
/// ```
pub fn split(bucket: &[u8], max_lines: usize) -> BatchSplitter<'_> {
    BatchSplitter {
        bucket,
        offset: 0,
        max_lines: max_lines.max(1),
    }
}

/// Iterator over batches of a bucket returned by [`split`].
#[derive(Clone, Debug)]
pub struct BatchSplitter<'a> {
    bucket: &'a [u8],
    offset: usize,
    max_lines: usize,
}

impl BatchSplitter<'_> {
    /// Returns the offset of the next batch within the bucket.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for BatchSplitter<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.offset;
        let mut end = start;
        let mut budget = self.max_lines;
        let mut has_content = false;

        while budget > 0 && end < self.bucket.len() {
            let rest = &self.bucket[end..];
            let line_len = memchr::memchr(b'\n', rest).unwrap_or(rest.len());
            let line = &rest[..line_len];

            if line.first() == Some(&b'#') {
                has_content = true;
            } else if !line.iter().all(u8::is_ascii_whitespace) {
                has_content = true;
                budget -= 1;
            }

            // Include the newline, if there is one.
            end = (end + line_len + 1).min(self.bucket.len());
        }

        self.offset = end;
        if !has_content {
            self.offset = self.bucket.len();
            return None;
        }

        let batch = &self.bucket[start..end];
        Some(if batch.ends_with(b"\n") {
            Cow::Borrowed(batch)
        } else {
            let mut owned = batch.to_vec();
            owned.push(b'\n');
            Cow::Owned(owned)
        })
    }
}

impl FusedIterator for BatchSplitter<'_> {}
