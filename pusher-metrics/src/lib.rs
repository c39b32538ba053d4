//! The text engine of the pusher.
//!
//! A scraped payload flows through the following stages, all operating on the raw bytes of the
//! exposition format:
//!
//!  1. [`Relabeler`] optionally rewrites the payload before anything else happens.
//!  2. [`scan`] locates metric lines and comment lines in a single pass.
//!  3. [`RecordBuilder`] renders each metric line, adding the collection timestamp and extra
//!     labels, and resolves its destinations through a [`RouteResolver`].
//!  4. [`mux`] regroups the rendered lines into one bucket per destination.
//!  5. [`split`] cuts each bucket into batches with a bounded number of samples.
//!
//! ```
//! use pusher_metrics::{LabelSet, RecordBuilder, RouteResolver, TimestampMode};
//!
//! let payload = b"# TYPE up gauge\nup 1\nnode_load1 0.21\n";
//! let resolver = RouteResolver::parse("node_ test4\n", "test0").unwrap();
//! let labels = LabelSet::new();
//! let builder = RecordBuilder::new(&resolver, &labels, TimestampMode::LabelAware, 1000);
//!
//! let buckets = pusher_metrics::mux(payload, &pusher_metrics::scan(payload), &builder);
//! assert_eq!(buckets.get("test0"), Some(&b"# TYPE up gauge\nup 1 1000\n"[..]));
//!
//! for batch in pusher_metrics::split(buckets.get("test4").unwrap(), 1000) {
//!     assert_eq!(&batch[..], b"# TYPE up gauge\nnode_load1 0.21 1000\n");
//! }
//! ```
#![warn(missing_docs)]

mod imux;
mod labels;
mod record;
mod relabel;
mod routes;
mod scanner;
mod split;

pub use self::imux::*;
pub use self::labels::{LabelSet, is_valid_label_name};
pub use self::record::*;
pub use self::relabel::*;
pub use self::routes::*;
pub use self::scanner::*;
pub use self::split::*;
