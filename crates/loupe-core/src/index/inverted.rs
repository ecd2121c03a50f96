//! Inverted token index over filenames.
//!
//! Maps each token to the set of record ids containing it, with a reverse
//! id→tokens map so a record's postings can be removed without re-deriving
//! its tokens. Thread safety is provided by the index-wide lock that owns
//! this structure.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct InvertedIndex {
    token_to_ids: HashMap<String, HashSet<u64>>,
    id_to_tokens: HashMap<u64, HashSet<String>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        InvertedIndex::default()
    }

    /// Register a record's tokens. Empty tokens are dropped.
    pub fn add_document(&mut self, id: u64, tokens: &[String]) {
        let entry = self.id_to_tokens.entry(id).or_default();
        for token in tokens {
            if token.is_empty() {
                continue;
            }
            if entry.insert(token.clone()) {
                self.token_to_ids
                    .entry(token.clone())
                    .or_default()
                    .insert(id);
            }
        }
    }

    /// Remove every posting for a record.
    pub fn remove_document(&mut self, id: u64) {
        if let Some(tokens) = self.id_to_tokens.remove(&id) {
            for token in tokens {
                if let Some(ids) = self.token_to_ids.get_mut(&token) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.token_to_ids.remove(&token);
                    }
                }
            }
        }
    }

    /// Replace a record's tokens.
    pub fn update_document(&mut self, id: u64, tokens: &[String]) {
        self.remove_document(id);
        self.add_document(id, tokens);
    }

    /// Ids containing a single token.
    pub fn lookup(&self, token: &str) -> Option<&HashSet<u64>> {
        self.token_to_ids.get(token)
    }

    /// Union of ids over several tokens.
    pub fn lookup_any(&self, tokens: &[String]) -> HashSet<u64> {
        let mut out = HashSet::new();
        for token in tokens {
            if let Some(ids) = self.token_to_ids.get(token) {
                out.extend(ids.iter().copied());
            }
        }
        out
    }

    /// Intersection of ids over several tokens.
    pub fn lookup_all(&self, tokens: &[String]) -> HashSet<u64> {
        let mut iter = tokens.iter().filter(|t| !t.is_empty());
        let first = match iter.next() {
            Some(t) => match self.token_to_ids.get(t) {
                Some(ids) => ids.clone(),
                None => return HashSet::new(),
            },
            None => return HashSet::new(),
        };
        iter.fold(first, |acc, t| match self.token_to_ids.get(t) {
            Some(ids) => acc.intersection(ids).copied().collect(),
            None => HashSet::new(),
        })
    }

    /// Tokens registered for a record.
    pub fn tokens_of(&self, id: u64) -> Option<&HashSet<String>> {
        self.id_to_tokens.get(&id)
    }

    pub fn token_count(&self) -> u64 {
        self.token_to_ids.len() as u64
    }

    pub fn document_count(&self) -> u64 {
        self.id_to_tokens.len() as u64
    }

    pub fn clear(&mut self) {
        self.token_to_ids.clear();
        self.id_to_tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_and_lookup() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &toks(&["report", "final", "pdf"]));
        idx.add_document(2, &toks(&["report", "draft", "doc"]));

        let hits = idx.lookup("report").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&1) && hits.contains(&2));

        let hits = idx.lookup("final").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(idx.lookup("missing").is_none());
    }

    #[test]
    fn test_empty_tokens_dropped() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &toks(&["", "real"]));
        assert!(idx.lookup("").is_none());
        assert!(idx.lookup("real").is_some());
    }

    #[test]
    fn test_remove_document() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &toks(&["alpha", "beta"]));
        idx.add_document(2, &toks(&["alpha"]));

        idx.remove_document(1);
        assert!(idx.tokens_of(1).is_none());
        assert!(idx.lookup("beta").is_none());
        assert_eq!(idx.lookup("alpha").unwrap().len(), 1);
        assert_eq!(idx.document_count(), 1);
    }

    #[test]
    fn test_update_document() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &toks(&["old", "name"]));
        idx.update_document(1, &toks(&["new", "name"]));

        assert!(idx.lookup("old").is_none());
        assert!(idx.lookup("new").unwrap().contains(&1));
        assert!(idx.lookup("name").unwrap().contains(&1));
    }

    #[test]
    fn test_lookup_any_and_all() {
        let mut idx = InvertedIndex::new();
        idx.add_document(1, &toks(&["a", "b"]));
        idx.add_document(2, &toks(&["b", "c"]));

        let any = idx.lookup_any(&toks(&["a", "c"]));
        assert_eq!(any.len(), 2);

        let all = idx.lookup_all(&toks(&["b", "c"]));
        assert_eq!(all.len(), 1);
        assert!(all.contains(&2));

        assert!(idx.lookup_all(&toks(&["a", "missing"])).is_empty());
        assert!(idx.lookup_all(&[]).is_empty());
    }
}
