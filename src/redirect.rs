//! Repository redirect table
//!
//! Records moves of a repository's canonical location as `from -> to` edges and
//! resolves identities through them transitively. The table holds at most one
//! outbound edge per source and mutations through [`RedirectTable::add`] never
//! introduce a cycle.
//!
//! The table may be loaded from several files. Rewriting keeps their comments
//! and the spelling of surviving edges; new edges go to [`REDIRECTS_FILE`].

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::{RedirectError, StorageError};
use crate::identity::RepositoryIdentity;
use crate::lines::LineFiles;
use crate::storage::REDIRECTS_FILE;

type Edge = (RepositoryIdentity, RepositoryIdentity);

const ARROW: &str = " -> ";

/// Result of following redirects from an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub identity: RepositoryIdentity,
    pub hops: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The identical edge was already present
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct RedirectTable {
    edges: IndexMap<RepositoryIdentity, RepositoryIdentity>,
    /// Every identity that has appeared on either side of an edge. Never shrinks,
    /// so its size bounds the length of any acyclic chain.
    registered: IndexSet<RepositoryIdentity>,
    files: LineFiles<Edge>,
}

impl Default for RedirectTable {
    fn default() -> Self {
        Self {
            edges: IndexMap::new(),
            registered: IndexSet::new(),
            files: LineFiles::new(REDIRECTS_FILE),
        }
    }
}

impl PartialEq for RedirectTable {
    fn eq(&self, other: &Self) -> bool {
        self.edges == other.edges
    }
}

impl Eq for RedirectTable {}

impl RedirectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepositoryIdentity, &RepositoryIdentity)> {
        self.edges.iter()
    }

    pub fn target_of(&self, from: &RepositoryIdentity) -> Option<&RepositoryIdentity> {
        self.edges.get(from)
    }

    /// Follow outbound edges from `identity` until none remain.
    pub fn resolve(&self, identity: &RepositoryIdentity) -> Result<Resolved, RedirectError> {
        let bound = self.registered.len();
        let mut visited = IndexSet::new();
        let mut current = identity;
        let mut hops = 0;

        while let Some(next) = self.edges.get(current) {
            if !visited.insert(current) || hops >= bound {
                return Err(RedirectError::Cycle {
                    identity: identity.clone(),
                });
            }
            current = next;
            hops += 1;
        }

        Ok(Resolved {
            identity: current.clone(),
            hops,
        })
    }

    /// `identity` and every identity its outbound edges reach, in order. Stops
    /// at the first repeat, so it terminates on cycles.
    pub fn chain(&self, identity: &RepositoryIdentity) -> IndexSet<RepositoryIdentity> {
        let mut chain = IndexSet::new();
        let mut current = identity;
        while chain.insert(current.clone()) {
            match self.edges.get(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        chain
    }

    /// Canonical identity for `identity`
    pub fn canonical(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<RepositoryIdentity, RedirectError> {
        self.resolve(identity).map(|resolved| resolved.identity)
    }

    /// Record `from -> to`.
    ///
    /// Fails with `Conflict` if `from` already points elsewhere and with `Cycle`
    /// if `to` resolves back to `from`. A rejected edge leaves the table untouched.
    pub fn add(
        &mut self,
        from: RepositoryIdentity,
        to: RepositoryIdentity,
    ) -> Result<AddOutcome, RedirectError> {
        if let Some(existing) = self.edges.get(&from) {
            if *existing == to {
                return Ok(AddOutcome::Unchanged);
            }
            return Err(RedirectError::Conflict {
                from,
                existing: existing.clone(),
                requested: to,
            });
        }

        if from == to || self.resolve(&to)?.identity == from {
            return Err(RedirectError::Cycle { identity: from });
        }

        debug!("Adding redirect {} -> {}", from, to);
        self.registered.insert(from.clone());
        self.registered.insert(to.clone());
        self.edges.insert(from, to);
        Ok(AddOutcome::Added)
    }

    /// Drop the outbound edge of `from`, returning its former target
    pub fn remove(&mut self, from: &RepositoryIdentity) -> Option<RepositoryIdentity> {
        self.edges.shift_remove(from)
    }

    /// Parse a single redirect file
    pub fn parse(text: &str, file: &str) -> Result<Self, StorageError> {
        Self::parse_files([(file, text)])
    }

    /// Parse `from -> to` lines from each `(file, text)` pair in order. Lines
    /// without an arrow and `#` comments carry no edge.
    ///
    /// Edges are inserted as written; a cycle in the files is reported later by
    /// [`RedirectTable::resolve`] rather than rejected here.
    pub fn parse_files<'a>(
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, StorageError> {
        let mut table = Self::new();

        for (file, text) in files {
            table.files.touch(file);
            for (index, raw) in text.lines().enumerate() {
                let line = raw.trim();
                let edge = if line.starts_with('#') {
                    None
                } else {
                    line.split_once(ARROW)
                };
                let Some((from, to)) = edge else {
                    table.files.push_verbatim(file, raw);
                    continue;
                };

                let malformed = |reason: String| StorageError::Malformed {
                    location: format!("{}:{}", file, index + 1),
                    reason,
                };
                let from = RepositoryIdentity::parse(from).map_err(|e| malformed(e.to_string()))?;
                let to = RepositoryIdentity::parse(to).map_err(|e| malformed(e.to_string()))?;

                if let Some(existing) = table.edges.get(&from)
                    && *existing != to
                {
                    return Err(malformed(format!(
                        "{} redirects to both {} and {}",
                        from, existing, to
                    )));
                }

                table.files.push_entry(file, (from.clone(), to.clone()), raw);
                table.registered.insert(from.clone());
                table.registered.insert(to.clone());
                table.edges.insert(from, to);
            }
        }

        Ok(table)
    }

    /// Contents of every file backing the table, as `(file, text)` pairs
    pub fn render_files(&self) -> Vec<(String, String)> {
        let edges: Vec<Edge> = self
            .edges
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        self.files.render(&edges, |(from, to)| {
            format!("{}{}{}", from.url(), ARROW, to.url())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(s: &str) -> RepositoryIdentity {
        RepositoryIdentity::parse(s).unwrap()
    }

    fn chain_table() -> RedirectTable {
        RedirectTable::parse(
            "https://github.com/old-org/repo1 -> https://github.com/new-org/repo1\n\
             https://github.com/old-org/repo2 -> https://github.com/new-org/repo2\n\
             https://github.com/temp-org/repo1 -> https://github.com/final-org/repo1\n\
             https://github.com/initial-org/repo1 -> https://github.com/temp-org/repo1\n\
             This is not a valid redirect\n\
             https://github.com/no-arrow-org/repo1\n",
            "redirects.txt",
        )
        .unwrap()
    }

    #[test]
    fn parse_ignores_lines_without_arrow() {
        let table = chain_table();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.target_of(&id("old-org/repo1")),
            Some(&id("new-org/repo1"))
        );
        assert_eq!(table.target_of(&id("no-arrow-org/repo1")), None);
    }

    #[rstest]
    #[case("old-org/repo1", "new-org/repo1", 1)]
    #[case("initial-org/repo1", "final-org/repo1", 2)]
    #[case("stable-org/repo1", "stable-org/repo1", 0)]
    fn resolve_follows_chains(#[case] input: &str, #[case] expected: &str, #[case] hops: usize) {
        let resolved = chain_table().resolve(&id(input)).unwrap();
        assert_eq!(resolved.identity, id(expected));
        assert_eq!(resolved.hops, hops);
    }

    #[rstest]
    #[case("initial-org/repo1")]
    #[case("temp-org/repo1")]
    #[case("final-org/repo1")]
    #[case("unrelated/repo")]
    fn resolve_is_idempotent(#[case] input: &str) {
        let table = chain_table();
        let once = table.canonical(&id(input)).unwrap();
        let twice = table.canonical(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn resolve_detects_cycle_in_loaded_table() {
        let table = RedirectTable::parse("a/x -> b/x\nb/x -> c/x\nc/x -> a/x\n", "redirects.txt")
            .unwrap();
        assert!(matches!(
            table.resolve(&id("a/x")),
            Err(RedirectError::Cycle { .. })
        ));
        // identities outside the cycle still resolve
        assert_eq!(table.canonical(&id("d/x")).unwrap(), id("d/x"));
    }

    #[test]
    fn chain_stops_at_cycle() {
        let table = RedirectTable::parse("c/x -> a/x\na/x -> b/x\nb/x -> a/x\n", "redirects.txt")
            .unwrap();

        let chain: Vec<RepositoryIdentity> = table.chain(&id("c/x")).into_iter().collect();

        assert_eq!(chain, vec![id("c/x"), id("a/x"), id("b/x")]);
        assert_eq!(table.chain(&id("d/x")).len(), 1);
    }

    #[test]
    fn add_identical_edge_is_idempotent() {
        let mut table = RedirectTable::new();
        assert_eq!(
            table.add(id("old/mod"), id("new/mod")).unwrap(),
            AddOutcome::Added
        );
        assert_eq!(
            table.add(id("old/mod"), id("new/mod")).unwrap(),
            AddOutcome::Unchanged
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn add_conflicting_edge_fails_without_mutation() {
        let mut table = RedirectTable::new();
        table.add(id("old/mod"), id("new/mod")).unwrap();
        let before = table.clone();

        let result = table.add(id("old/mod"), id("other/mod"));

        assert!(matches!(result, Err(RedirectError::Conflict { .. })));
        assert_eq!(table, before);
    }

    #[rstest]
    #[case(vec![], ("a/x", "a/x"))]
    #[case(vec![("a/x", "b/x")], ("b/x", "a/x"))]
    #[case(vec![("a/x", "b/x"), ("b/x", "c/x")], ("c/x", "a/x"))]
    #[case(vec![("b/x", "c/x"), ("c/x", "a/x")], ("a/x", "b/x"))]
    fn add_cycle_fails_without_mutation(
        #[case] existing: Vec<(&str, &str)>,
        #[case] edge: (&str, &str),
    ) {
        let mut table = RedirectTable::new();
        for (from, to) in existing {
            table.add(id(from), id(to)).unwrap();
        }
        let before = table.clone();

        let result = table.add(id(edge.0), id(edge.1));

        assert!(matches!(result, Err(RedirectError::Cycle { .. })));
        assert_eq!(table, before);
    }

    #[test]
    fn remove_drops_edge() {
        let mut table = RedirectTable::new();
        table.add(id("old/mod"), id("new/mod")).unwrap();

        assert_eq!(table.remove(&id("old/mod")), Some(id("new/mod")));
        assert_eq!(table.canonical(&id("old/mod")).unwrap(), id("old/mod"));
        assert_eq!(table.remove(&id("old/mod")), None);
    }

    #[test]
    fn parse_rejects_conflicting_sources() {
        let result = RedirectTable::parse("a/x -> b/x\na/x -> c/x\n", "redirects.txt");
        assert!(matches!(result, Err(StorageError::Malformed { .. })));
    }

    #[test]
    fn render_then_parse_preserves_edges() {
        let table = chain_table();
        let rendered = table.render_files();
        assert_eq!(rendered.len(), 1);

        let reparsed = RedirectTable::parse(&rendered[0].1, "redirects.txt").unwrap();
        assert_eq!(reparsed, table);
    }

    #[test]
    fn render_keeps_comments_and_appends_new_edges() {
        let mut table = RedirectTable::parse_files([
            ("moves-2023.txt", "# org rename\nold/a -> new/a\nold/b -> new/b\n"),
            ("redirects.txt", "# misc\n"),
        ])
        .unwrap();

        table.remove(&id("old/b"));
        table.add(id("old/c"), id("new/c")).unwrap();

        assert_eq!(
            table.render_files(),
            vec![
                (
                    "moves-2023.txt".to_string(),
                    "# org rename\nold/a -> new/a\n".to_string()
                ),
                (
                    "redirects.txt".to_string(),
                    "# misc\nhttps://github.com/old/c -> https://github.com/new/c\n".to_string()
                ),
            ]
        );
    }

    #[test]
    fn edges_from_separate_files_chain() {
        let table =
            RedirectTable::parse_files([("a.txt", "a/x -> b/x\n"), ("b.txt", "b/x -> c/x\n")])
                .unwrap();

        assert_eq!(table.canonical(&id("a/x")).unwrap(), id("c/x"));
    }
}
