//! Segment-level prefix tree backing the router
//!
//! Nodes live in one `Vec` arena; child links and parent back-links are
//! indices into it. Index 0 is the root and stands for `/`, so handlers
//! registered at the root apply to every resolvable path. The back-links
//! make resolution a single pass: find the terminal node, then walk the
//! parent chain collecting ancestor values.

/// One path segment key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SegmentKey {
    Root,
    Literal(String),
    /// Named capture, registered as `:name`. At most one per node.
    Param(String),
}

#[derive(Debug, Clone)]
struct Node<T> {
    key: SegmentKey,
    parent: usize,
    children: Vec<usize>,
    value: Option<T>,
}

/// Prefix tree keyed by path segments.
#[derive(Debug, Clone)]
pub(crate) struct Trie<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Trie<T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node {
                key: SegmentKey::Root,
                parent: 0,
                children: Vec::new(),
                value: None,
            }],
        }
    }

    /// Stores `value` at the node for `path`, creating intermediate nodes.
    /// Re-insertion at the same path overwrites: last write wins.
    pub(crate) fn insert(&mut self, path: &str, value: T) {
        let mut current = 0;

        for segment in segments(path) {
            current = match segment.strip_prefix(':') {
                Some(name) => self.param_child(current, name),
                None => self.literal_child(current, segment),
            };
        }

        self.nodes[current].value = Some(value);
    }

    /// Resolves `path` to the values on the route from the root to its
    /// terminal node, in root-to-leaf order.
    ///
    /// An exact terminal match is required: if any segment has no matching
    /// child, or the final node holds no value, the result is empty and
    /// `params` is left untouched. Captured parameters are appended to
    /// `params` only on a successful match.
    pub(crate) fn resolve<'t>(
        &'t self,
        path: &str,
        params: &mut Vec<(String, String)>,
    ) -> Vec<&'t T> {
        let mut current = 0;
        let mut captured: Vec<(String, String)> = Vec::new();

        for segment in segments(path) {
            let literal = self.nodes[current]
                .children
                .iter()
                .copied()
                .find(|&c| matches!(&self.nodes[c].key, SegmentKey::Literal(s) if s == segment));

            current = match literal {
                Some(child) => child,
                None => {
                    let param = self.nodes[current].children.iter().copied().find_map(|c| {
                        match &self.nodes[c].key {
                            SegmentKey::Param(name) => Some((c, name)),
                            _ => None,
                        }
                    });
                    match param {
                        Some((child, name)) => {
                            captured.push((name.clone(), segment.to_owned()));
                            child
                        }
                        None => return Vec::new(),
                    }
                }
            };
        }

        if self.nodes[current].value.is_none() {
            return Vec::new();
        }

        // Terminal value first, then the ancestor walk; reversed at the end
        // so the root comes out first.
        let mut found = Vec::new();
        loop {
            if let Some(value) = &self.nodes[current].value {
                found.push(value);
            }
            if current == 0 {
                break;
            }
            current = self.nodes[current].parent;
        }
        found.reverse();

        params.append(&mut captured);
        found
    }

    fn literal_child(&mut self, parent: usize, segment: &str) -> usize {
        let existing = self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| matches!(&self.nodes[c].key, SegmentKey::Literal(s) if s == segment));

        match existing {
            Some(child) => child,
            None => self.push_child(parent, SegmentKey::Literal(segment.to_owned())),
        }
    }

    // A node has at most one parameter child; registering a different name
    // at the same position renames it (last write wins, like values).
    fn param_child(&mut self, parent: usize, name: &str) -> usize {
        let existing = self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| matches!(self.nodes[c].key, SegmentKey::Param(_)));

        match existing {
            Some(child) => {
                self.nodes[child].key = SegmentKey::Param(name.to_owned());
                child
            }
            None => self.push_child(parent, SegmentKey::Param(name.to_owned())),
        }
    }

    fn push_child(&mut self, parent: usize, key: SegmentKey) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            key,
            parent,
            children: Vec::new(),
            value: None,
        });
        self.nodes[parent].children.push(index);
        index
    }
}

// Empty segments collapse, so "/a//b/" and "/a/b" name the same node and
// "/" maps to the root itself.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_plain<'t>(trie: &'t Trie<&str>, path: &str) -> Vec<&'t str> {
        let mut params = Vec::new();
        trie.resolve(path, &mut params).into_iter().copied().collect()
    }

    #[test]
    fn root_to_leaf_order() {
        let mut trie = Trie::new();
        trie.insert("/", "root");
        trie.insert("/api", "api");
        trie.insert("/api/users", "users");

        assert_eq!(resolve_plain(&trie, "/api/users"), ["root", "api", "users"]);
        assert_eq!(resolve_plain(&trie, "/api"), ["root", "api"]);
        assert_eq!(resolve_plain(&trie, "/"), ["root"]);
    }

    #[test]
    fn ancestors_without_values_are_skipped() {
        let mut trie = Trie::new();
        trie.insert("/a/b/c", "leaf");

        // neither "/", "/a" nor "/a/b" hold values
        assert_eq!(resolve_plain(&trie, "/a/b/c"), ["leaf"]);
    }

    #[test]
    fn no_partial_fallback() {
        let mut trie = Trie::new();
        trie.insert("/", "root");
        trie.insert("/api", "api");

        // "/api/unknown" walks past "/api" but the terminal node is missing,
        // so nothing matches, not even the root.
        assert_eq!(resolve_plain(&trie, "/api/unknown"), Vec::<&str>::new());
        // intermediate node exists but holds no value
        let mut trie = Trie::new();
        trie.insert("/a/b", "b");
        assert_eq!(resolve_plain(&trie, "/a"), Vec::<&str>::new());
    }

    #[test]
    fn last_write_wins() {
        let mut trie = Trie::new();
        trie.insert("/x", "first");
        trie.insert("/x", "second");

        assert_eq!(resolve_plain(&trie, "/x"), ["second"]);
    }

    #[test]
    fn empty_segments_collapse() {
        let mut trie = Trie::new();
        trie.insert("/a/b", "ab");

        assert_eq!(resolve_plain(&trie, "//a///b/"), ["ab"]);
    }

    #[test]
    fn param_capture() {
        let mut trie = Trie::new();
        trie.insert("/users/:id/posts", "posts");

        let mut params = Vec::new();
        let found = trie.resolve("/users/42/posts", &mut params);

        assert_eq!(found, [&"posts"]);
        assert_eq!(params, [("id".to_owned(), "42".to_owned())]);
    }

    #[test]
    fn literal_beats_param() {
        let mut trie = Trie::new();
        trie.insert("/users/me", "me");
        trie.insert("/users/:id", "by_id");

        let mut params = Vec::new();
        assert_eq!(trie.resolve("/users/me", &mut params), [&"me"]);
        assert!(params.is_empty());

        assert_eq!(trie.resolve("/users/42", &mut params), [&"by_id"]);
        assert_eq!(params, [("id".to_owned(), "42".to_owned())]);
    }

    #[test]
    fn params_untouched_on_miss() {
        let mut trie = Trie::new();
        trie.insert("/users/:id/posts", "posts");

        let mut params = Vec::new();
        // the ":id" segment matches "42" but "comments" has no child
        let found = trie.resolve("/users/42/comments", &mut params);

        assert!(found.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn param_renaming_last_wins() {
        let mut trie = Trie::new();
        trie.insert("/u/:id", "first");
        trie.insert("/u/:uid", "second");

        let mut params = Vec::new();
        assert_eq!(trie.resolve("/u/7", &mut params), [&"second"]);
        assert_eq!(params, [("uid".to_owned(), "7".to_owned())]);
    }
}
