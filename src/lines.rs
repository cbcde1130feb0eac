//! Line-oriented artifacts spread across several text files
//!
//! Every line is kept as read, so a rewrite re-emits comments, blank lines and
//! untouched entries verbatim. Entries removed since loading are dropped from the
//! file that declared them; entries added since loading are appended to the
//! primary file.

use std::collections::HashSet;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line<K> {
    Verbatim(String),
    Entry { key: K, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFiles<K> {
    primary: String,
    files: IndexMap<String, Vec<Line<K>>>,
}

impl<K: Clone + Eq + Hash> LineFiles<K> {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            files: IndexMap::new(),
        }
    }

    /// Make sure `file` is rendered even if it ends up with no lines
    pub fn touch(&mut self, file: &str) {
        if !self.files.contains_key(file) {
            self.files.insert(file.to_string(), Vec::new());
        }
    }

    pub fn push_verbatim(&mut self, file: &str, text: &str) {
        self.lines_mut(file).push(Line::Verbatim(text.to_string()));
    }

    pub fn push_entry(&mut self, file: &str, key: K, text: &str) {
        self.lines_mut(file).push(Line::Entry {
            key,
            text: text.to_string(),
        });
    }

    fn lines_mut(&mut self, file: &str) -> &mut Vec<Line<K>> {
        self.files.entry(file.to_string()).or_default()
    }

    /// Contents of every file given the entries that should exist now.
    ///
    /// A loaded entry keeps its original text at its first occurrence. `format`
    /// renders entries that no file declared.
    pub fn render<'a, F>(
        &self,
        current: impl IntoIterator<Item = &'a K>,
        format: F,
    ) -> Vec<(String, String)>
    where
        K: 'a,
        F: Fn(&K) -> String,
    {
        let current: IndexSet<&K> = current.into_iter().collect();
        let mut emitted: HashSet<&K> = HashSet::new();
        let mut rendered: Vec<(String, String)> = Vec::with_capacity(self.files.len() + 1);

        for (file, lines) in &self.files {
            let mut contents = String::new();
            for line in lines {
                match line {
                    Line::Verbatim(text) => {
                        contents.push_str(text);
                        contents.push('\n');
                    }
                    Line::Entry { key, text } => {
                        if current.contains(key) && emitted.insert(key) {
                            contents.push_str(text);
                            contents.push('\n');
                        }
                    }
                }
            }
            rendered.push((file.clone(), contents));
        }

        let added: String = current
            .iter()
            .filter(|key| !emitted.contains(*key))
            .map(|key| format!("{}\n", format(*key)))
            .collect();
        if !added.is_empty() {
            match rendered.iter_mut().find(|(file, _)| *file == self.primary) {
                Some((_, contents)) => contents.push_str(&added),
                None => rendered.push((self.primary.clone(), added)),
            }
        }

        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(key: &String) -> String {
        key.to_uppercase()
    }

    #[test]
    fn render_keeps_comments_and_drops_removed_entries() {
        let mut files = LineFiles::new("main.txt");
        files.push_verbatim("main.txt", "# header");
        files.push_entry("main.txt", "a".to_string(), "A as written");
        files.push_verbatim("main.txt", "");
        files.push_entry("main.txt", "b".to_string(), "B as written");

        let current = ["a".to_string()];
        let rendered = files.render(current.iter(), upper);

        assert_eq!(
            rendered,
            vec![("main.txt".to_string(), "# header\nA as written\n\n".to_string())]
        );
    }

    #[test]
    fn render_appends_new_entries_to_primary_file() {
        let mut files = LineFiles::new("main.txt");
        files.push_entry("extra.txt", "a".to_string(), "a");
        files.push_entry("main.txt", "b".to_string(), "b");

        let current = ["a".to_string(), "b".to_string(), "c".to_string()];
        let rendered = files.render(current.iter(), upper);

        assert_eq!(
            rendered,
            vec![
                ("extra.txt".to_string(), "a\n".to_string()),
                ("main.txt".to_string(), "b\nC\n".to_string()),
            ]
        );
    }

    #[test]
    fn render_creates_primary_file_when_nothing_was_loaded() {
        let files: LineFiles<String> = LineFiles::new("main.txt");

        let current = ["a".to_string()];
        let rendered = files.render(current.iter(), upper);

        assert_eq!(rendered, vec![("main.txt".to_string(), "A\n".to_string())]);
        assert!(files.render(std::iter::empty(), upper).is_empty());
    }

    #[test]
    fn duplicate_entry_is_emitted_once() {
        let mut files = LineFiles::new("main.txt");
        files.push_entry("main.txt", "a".to_string(), "a");
        files.push_entry("other.txt", "a".to_string(), "a again");

        let current = ["a".to_string()];
        let rendered = files.render(current.iter(), upper);

        assert_eq!(rendered[0].1, "a\n");
        assert_eq!(rendered[1].1, "");
    }
}
