//! Route resolution.
//!
//! Route patterns are absolute paths whose segments are either literals or
//! the wildcard `*`. The table is compiled into a trie at startup, with the
//! wildcard as a sibling slot on each node, so resolution never enumerates
//! candidate patterns.
//!
//! Matching is longest-prefix: a pattern shorter than the URI matches as a
//! prefix. Among all matches the winner is chosen by segment count (longer
//! first), then wildcard count (fewer first), then declaration order.

use std::collections::HashMap;
use std::sync::Arc;

use fnrelay_common::{normalize_uri, GatewayError, LambdaSpec, Result};

/// A compiled, immutable route table. Safe to share across request tasks
/// without locking.
#[derive(Debug)]
pub struct RouteTable {
    root: TrieNode,
}

#[derive(Default, Debug)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    wildcard: Option<Box<TrieNode>>,
    route: Option<RouteEntry>,
}

#[derive(Debug)]
struct RouteEntry {
    lambda: Arc<LambdaSpec>,
    order: usize,
}

/// One resolution candidate while walking the trie.
struct Candidate {
    lambda: Arc<LambdaSpec>,
    depth: usize,
    wildcards: usize,
    order: usize,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        (self.depth, std::cmp::Reverse(self.wildcards), std::cmp::Reverse(self.order))
            > (other.depth, std::cmp::Reverse(other.wildcards), std::cmp::Reverse(other.order))
    }
}

impl RouteTable {
    /// Compiles a route table, preserving declaration order for tie-breaks.
    ///
    /// Patterns must start with `/`. When the same pattern appears twice the
    /// first declaration wins, matching a first-hit scan of the table.
    pub fn from_routes(routes: Vec<(String, LambdaSpec)>) -> Result<RouteTable> {
        let mut root = TrieNode::default();

        for (order, (pattern, lambda)) in routes.into_iter().enumerate() {
            if !pattern.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "route pattern must start with '/': {:?}",
                    pattern
                )));
            }
            lambda.validate()?;

            let normalized = normalize_uri(&pattern);
            let mut node = &mut root;
            for segment in normalized.split('/').filter(|s| !s.is_empty()) {
                node = if segment == "*" {
                    &mut **node.wildcard.get_or_insert_with(Default::default)
                } else {
                    node.children.entry(segment.to_string()).or_default()
                };
            }

            if node.route.is_some() {
                tracing::warn!(pattern = %pattern, "duplicate route pattern ignored");
                continue;
            }
            node.route = Some(RouteEntry { lambda: Arc::new(lambda), order });
        }

        Ok(RouteTable { root })
    }

    /// Resolves a normalized URI to its backend spec, or `None` for a 404.
    pub fn resolve(&self, uri: &str) -> Option<Arc<LambdaSpec>> {
        let segments: Vec<&str> = uri.split('/').filter(|s| !s.is_empty()).collect();

        if segments.is_empty() {
            // Root: exact `/` first, then `/*`.
            return self
                .root
                .route
                .as_ref()
                .or_else(|| self.root.wildcard.as_ref().and_then(|w| w.route.as_ref()))
                .map(|entry| entry.lambda.clone());
        }

        let mut best: Option<Candidate> = None;
        collect(&self.root, &segments, 0, 0, &mut best);
        best.map(|candidate| candidate.lambda)
    }
}

fn collect(
    node: &TrieNode,
    segments: &[&str],
    depth: usize,
    wildcards: usize,
    best: &mut Option<Candidate>,
) {
    if depth > 0 {
        if let Some(entry) = &node.route {
            let candidate = Candidate {
                lambda: entry.lambda.clone(),
                depth,
                wildcards,
                order: entry.order,
            };
            if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                *best = Some(candidate);
            }
        }
    }

    if depth == segments.len() {
        return;
    }

    if let Some(child) = node.children.get(segments[depth]) {
        collect(child, segments, depth + 1, wildcards, best);
    }
    if let Some(wild) = &node.wildcard {
        collect(wild, segments, depth + 1, wildcards + 1, best);
    }
}
