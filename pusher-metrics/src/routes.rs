//! Routing of metric names to destinations.
//!
//! Routes are loaded from a mapping file with one route per line:
//!
//! ```text
//! # prefix      destinations
//! node_memory   test4,test-bck
//! go_           test1
//! ```
//!
//! A metric is routed by the longest prefix of its name that has a route. Metrics without a
//! route, and routes with an empty destination list, use the default destinations.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An error returned when loading a route map.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The route map file could not be read.
    #[error("could not read route map {}", path.display())]
    Io {
        /// The path of the route map.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A route is missing its destination column.
    #[error("missing destinations for prefix `{prefix}` on line {line}")]
    MissingDestinations {
        /// The one-based line number.
        line: usize,
        /// The prefix that was declared on this line.
        prefix: String,
    },
}

/// Parses a comma separated list of destinations.
///
/// Surrounding whitespace is trimmed, empty entries and duplicates are dropped. The order of first
/// occurrence is kept.
///
/// ```
/// let destinations = pusher_metrics::parse_destinations("test0, test-bck,,test0");
/// assert_eq!(destinations, ["test0", "test-bck"]);
/// ```
pub fn parse_destinations(list: &str) -> Vec<String> {
    let mut destinations: Vec<String> = Vec::new();
    for destination in list.split(',').map(str::trim) {
        if !destination.is_empty() && !destinations.iter().any(|d| d == destination) {
            destinations.push(destination.to_owned());
        }
    }
    destinations
}

/// A node of the compressed prefix trie.
///
/// Every child has a non-empty edge label. Children are sorted by the first byte of their label,
/// which is unique among siblings.
#[derive(Clone, Debug, Default)]
struct Node {
    label: Vec<u8>,
    value: Option<Vec<String>>,
    children: Vec<Node>,
}

impl Node {
    fn find_child(&self, byte: u8) -> Result<usize, usize> {
        self.children
            .binary_search_by_key(&Some(byte), |child| child.label.first().copied())
    }

    /// Splits the edge label at `at`, moving the tail and everything below it into a new child.
    fn split(&mut self, at: usize) {
        let tail = Node {
            label: self.label.split_off(at),
            value: self.value.take(),
            children: std::mem::take(&mut self.children),
        };
        self.children.push(tail);
    }
}

/// Maps metric names to destinations by longest prefix.
///
/// Resolvers are immutable once built. To change routes, build a new resolver and swap it in.
#[derive(Clone, Default)]
pub struct RouteResolver {
    root: Node,
    len: usize,
    default: Vec<String>,
}

impl RouteResolver {
    /// Creates an empty resolver routing everything to `default`.
    pub fn new(default: Vec<String>) -> Self {
        Self {
            root: Node::default(),
            len: 0,
            default,
        }
    }

    /// Parses a route map from its text.
    ///
    /// `default` is a comma separated list of destinations for unmatched metrics.
    pub fn parse(routes: &str, default: &str) -> Result<Self, RouteError> {
        let mut resolver = Self::new(parse_destinations(default));

        for (index, line) in routes.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((prefix, destinations)) = line.split_once(char::is_whitespace) else {
                return Err(RouteError::MissingDestinations {
                    line: index + 1,
                    prefix: line.to_owned(),
                });
            };

            let destinations = destinations.trim();
            if destinations.is_empty() {
                return Err(RouteError::MissingDestinations {
                    line: index + 1,
                    prefix: prefix.to_owned(),
                });
            }

            resolver.insert(prefix.as_bytes(), parse_destinations(destinations));
        }

        Ok(resolver)
    }

    /// Loads a route map from a file.
    pub fn from_file(path: impl AsRef<Path>, default: &str) -> Result<Self, RouteError> {
        let path = path.as_ref();
        let routes = fs::read_to_string(path).map_err(|source| RouteError::Io {
            path: path.to_owned(),
            source,
        })?;

        let resolver = Self::parse(&routes, default)?;
        pusher_log::debug!(
            path = %path.display(),
            routes = resolver.len(),
            "loaded route map"
        );
        Ok(resolver)
    }

    /// Inserts a route, returning the destinations previously registered for the same prefix.
    pub fn insert(&mut self, prefix: &[u8], destinations: Vec<String>) -> Option<Vec<String>> {
        let mut node = &mut self.root;
        let mut key = prefix;

        loop {
            let Some(&first) = key.first() else {
                let previous = node.value.replace(destinations);
                if previous.is_none() {
                    self.len += 1;
                }
                return previous;
            };

            let index = match node.find_child(first) {
                Ok(index) => index,
                Err(index) => {
                    node.children.insert(
                        index,
                        Node {
                            label: key.to_vec(),
                            value: Some(destinations),
                            children: Vec::new(),
                        },
                    );
                    self.len += 1;
                    return None;
                }
            };

            let child = &mut node.children[index];
            let common = child
                .label
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count();

            if common < child.label.len() {
                child.split(common);
            }

            key = &key[common..];
            node = child;
        }
    }

    /// Returns the destinations of the longest registered prefix of `name`, if any.
    fn longest_match(&self, name: &[u8]) -> Option<&[String]> {
        let mut node = &self.root;
        let mut rest = name;
        let mut best = node.value.as_deref();

        while let Some(&first) = rest.first() {
            let Ok(index) = node.find_child(first) else {
                break;
            };

            let child = &node.children[index];
            let Some(tail) = rest.strip_prefix(child.label.as_slice()) else {
                break;
            };

            if let Some(value) = child.value.as_deref() {
                best = Some(value);
            }

            rest = tail;
            node = child;
        }

        best
    }

    /// Returns the destinations for a metric name.
    ///
    /// Never returns an empty list unless the default destinations are empty.
    pub fn route(&self, name: &[u8]) -> &[String] {
        match self.longest_match(name) {
            Some(destinations) if !destinations.is_empty() => destinations,
            _ => &self.default,
        }
    }

    /// Returns the default destinations.
    pub fn default_route(&self) -> &[String] {
        &self.default
    }

    /// Returns the number of registered prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no prefixes are registered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for RouteResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteResolver")
            .field("routes", &self.len)
            .field("default", &self.default)
            .finish()
    }
}
