//! Similarity search.
//!
//! The query text is analyzed like a document. Every distinct term it
//! contains is weighted by how often it occurs in the text plus how rare it
//! is in the index (document count over posting count), and the postings of
//! the heaviest terms are scanned. A document's score is the sum of the
//! weights of the terms it shares with the query.

use ahash::AHashMap;
use log::info;

use crate::error::Result;
use crate::query::{SelectOptions, Searcher};
use crate::records::{Operator, RecordKey, Records};

impl Searcher<'_> {
    pub(crate) fn similar_hits(
        &self,
        query: &str,
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
    ) -> Result<()> {
        let mut weights: AHashMap<u32, i64> = AHashMap::new();
        for token in self.analyzer.analyze(query)? {
            let key = token.text.as_bytes();
            if let Some(tid) = self.lexicon.get(key) {
                *weights.entry(tid).or_default() += 1;
            }
            if key.is_empty() {
                continue;
            }
            let expansion = options.similar_expansion;
            if expansion.prefix {
                for tid in self.lexicon.prefix_search(key) {
                    weights.entry(tid).or_default();
                }
            }
            if expansion.suffix {
                for tid in self.lexicon.suffix_search(key) {
                    weights.entry(tid).or_default();
                }
            }
        }

        let n_keys = self.keys.len() as i64;
        let mut terms: Vec<(u32, i64)> = Vec::with_capacity(weights.len());
        for (tid, occurrences) in weights {
            let size = self.store.estimate_size(tid)?;
            if size > 0 {
                terms.push((tid, occurrences + n_keys / i64::from(size)));
            }
        }
        let n = terms.len();
        let limit = if options.similarity_threshold > 0 {
            options.similarity_threshold.min(n)
        } else {
            (n / 8 + 1).min(n)
        };
        terms.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        terms.truncate(limit);
        info!("similar: {limit} of {n} terms ({query})");

        let rep = records.wants_positions();
        for (tid, w1) in terms {
            let Some(mut cursor) = self.store.cursor(self.lexicon, tid)? else {
                continue;
            };
            while cursor.next()? {
                let Some(posting) = cursor.posting() else {
                    break;
                };
                let (rid, sid) = (posting.rid, posting.sid);
                let w2 = self.weight(posting.id(), options);
                if w2 == 0 {
                    continue;
                }
                let score = i64::from(posting.score);
                if rep {
                    for &pos in &posting.positions {
                        let key = RecordKey::new(rid, sid, pos);
                        self.add(records, key, w1 * w2 * (1 + score), op);
                    }
                } else {
                    let tf = i64::from(posting.tf);
                    self.add(records, RecordKey::new(rid, sid, 0), w1 * w2 * (tf + score), op);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::query::select::tests::Fixture;
    use crate::query::{Expansion, SelectMode, SelectOptions};
    use crate::records::RecordKey;

    #[test]
    fn test_rare_terms_rank_first() {
        let mut fx = Fixture::new();
        let d1 = fx.index("d1", 1, "the rust compiler");
        let d2 = fx.index("d2", 1, "the borrow checker");
        let d3 = fx.index("d3", 1, "the end");

        // "the" is in every document, "rust" in one: only "rust" is scanned
        let options = SelectOptions::new(SelectMode::Similar);
        let records = fx.select("the rust", &options);
        assert_eq!(records.nhits(), 1);
        assert!(records.record(RecordKey::new(d1, 0, 0)).is_some());

        let options = options.with_similarity_threshold(5);
        let records = fx.select("the rust", &options);
        assert_eq!(records.nhits(), 3);
        let rust = records.record(RecordKey::new(d1, 0, 0)).unwrap().score;
        let common = records.record(RecordKey::new(d2, 0, 0)).unwrap().score;
        assert!(rust > common);
        assert_eq!(records.record(RecordKey::new(d3, 0, 0)).unwrap().score, common);
    }

    #[test]
    fn test_expansion_adds_related_terms() {
        let mut fx = Fixture::new();
        fx.index("d1", 1, "searching");
        fx.index("d2", 1, "research");

        let options = SelectOptions::new(SelectMode::Similar).with_similarity_threshold(10);
        assert!(fx.select("search", &options).is_empty());

        let options = options.with_similar_expansion(Expansion::PREFIX);
        assert_eq!(fx.select("search", &options).nhits(), 1);

        let options = options.with_similar_expansion(Expansion::BOTH);
        assert_eq!(fx.select("search", &options).nhits(), 2);
    }
}
