//! Extracting lexicon terms from free text.
//!
//! The normalized text is scanned left to right. At each offset the longest
//! lexicon term the rest of the text starts with is taken; its postings
//! become hits. With [`TermExtractPolicy::EachPost`] the result set is
//! reopened at section granularity and each hit is keyed by the byte
//! offset at which its term was found in the text (in the section slot),
//! so iterating the sorted result walks the text in order.

use log::debug;

use crate::error::Result;
use crate::query::{SelectOptions, Searcher, TermExtractPolicy};
use crate::records::{Operator, RecordKey, RecordUnit, Records, SortOrder};

/// Records kept after sorting an `EachPost` extraction.
const EACH_POST_SORT_LIMIT: usize = 10000;

impl Searcher<'_> {
    pub(crate) fn term_extract_hits(
        &self,
        text: &str,
        records: &mut Records,
        op: Operator,
        options: &SelectOptions,
    ) -> Result<()> {
        let policy = options.term_extract;
        if policy == TermExtractPolicy::EachPost {
            let keys = records.keys().cloned();
            let ignore_deleted = records.ignore_deleted_records();
            records.reopen(RecordUnit::Section, RecordUnit::None, 0)?;
            if let Some(keys) = keys {
                records.set_keys(keys);
            }
            records.set_ignore_deleted_records(ignore_deleted);
        }
        let rep = records.wants_positions();

        let normalized = self.analyzer.normalize(text);
        let mut offset = 0;
        while let Some(rest) = normalized.get(offset..).filter(|rest| !rest.is_empty()) {
            let char_len = rest.chars().next().map_or(1, char::len_utf8);
            let Some((tid, key_len)) = self.lexicon.common_prefix_search(rest.as_bytes()) else {
                offset += char_len;
                continue;
            };
            let skip = match policy {
                TermExtractPolicy::EachPost => key_len,
                TermExtractPolicy::EachTerm => char_len,
            };
            debug!("extracted term {tid} at {offset}");

            if let Some(mut cursor) = self.store.cursor(self.lexicon, tid)? {
                while cursor.next()? {
                    let Some(posting) = cursor.posting() else {
                        break;
                    };
                    let (rid, sid) = (posting.rid, posting.sid);
                    if rep {
                        let weight = self.weight(posting.id(), options);
                        for &pos in &posting.positions {
                            self.add(records, RecordKey::new(rid, sid, pos), weight, op);
                        }
                    } else if policy == TermExtractPolicy::EachPost {
                        let key = RecordKey::new(rid, offset as u32, 0);
                        self.add(records, key, offset as i64 + 1, op);
                    } else {
                        let weight = self.weight(posting.id(), options);
                        self.add(records, RecordKey::new(rid, sid, 0), weight, op);
                    }
                }
            }
            // a key that ends inside a character cannot be a term of
            // normalized text; step over the character instead
            offset += if normalized.is_char_boundary(offset + skip) {
                skip
            } else {
                char_len
            };
        }

        Ok(())
    }
}

/// Order an `EachPost` extraction by text offset.
pub(crate) fn sort_extracted(records: &mut Records, options: &SelectOptions) -> Result<()> {
    if options.term_extract == TermExtractPolicy::EachPost && !records.is_empty() {
        records.sort(EACH_POST_SORT_LIMIT, SortOrder::Ascending)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::query::select::tests::Fixture;
    use crate::query::{SelectMode, SelectOptions, TermExtractPolicy};
    use crate::records::{Operator, RecordKey, RecordUnit, Records};

    #[test]
    fn test_each_post_keys_hits_by_offset() {
        let mut fx = Fixture::new();
        let d1 = fx.index("d1", 1, "rust");
        let d2 = fx.index("d2", 1, "fast rust");

        let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0).unwrap();
        let options = SelectOptions::new(SelectMode::TermExtract);
        assert_eq!(options.term_extract, TermExtractPolicy::EachPost);
        fx.searcher()
            .select("Rust is fast", &mut records, Operator::Or, &options)
            .unwrap();
        assert_eq!(records.record_unit(), RecordUnit::Section);
        assert_eq!(records.nhits(), 3);
        assert_eq!(records.record(RecordKey::new(d1, 0, 0)).unwrap().score, 1);
        assert_eq!(records.record(RecordKey::new(d2, 0, 0)).unwrap().score, 1);
        assert_eq!(records.record(RecordKey::new(d2, 8, 0)).unwrap().score, 9);
        assert_eq!(records.next().unwrap().score, 1);
        assert_eq!(records.next().unwrap().score, 1);
        assert_eq!(records.next().unwrap().key, RecordKey::new(d2, 8, 0));
    }

    #[test]
    fn test_each_term_adds_documents() {
        let mut fx = Fixture::new();
        let d1 = fx.index("d1", 1, "rust");
        fx.index("d2", 1, "fast rust");
        fx.index("d3", 1, "slow");

        let options = SelectOptions::new(SelectMode::TermExtract)
            .with_term_extract(TermExtractPolicy::EachTerm);
        let records = fx.select("rust is fast", &options);
        assert_eq!(records.record_unit(), RecordUnit::Document);
        assert_eq!(records.nhits(), 2);
        assert_eq!(records.record(RecordKey::new(d1, 0, 0)).unwrap().score, 1);

        assert!(fx.select("nothing here", &options).is_empty());
    }
}
