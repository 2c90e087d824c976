use std::collections::BTreeSet;

use glaive::config::IndexConfig;
use glaive::error::Result;
use glaive::index::{Index, Values};
use glaive::query::{SelectMode, SelectOptions};
use glaive::records::{Operator, RecordUnit, Records, SortOrder};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

const WORDS: [&str; 10] = [
    "search", "engine", "index", "query", "term", "phrase", "near", "score", "chunk", "buffer",
];

fn documents(seed: u64, count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let len = rng.random_range(3..15);
            (0..len)
                .map(|_| *WORDS.choose(&mut rng).unwrap_or(&"term"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn build(config: IndexConfig, docs: &[String]) -> Result<Index> {
    let index = Index::create(config)?;
    for (i, text) in docs.iter().enumerate() {
        index.upd(format!("doc{i}").as_bytes(), None, Some(text.as_str()))?;
    }
    Ok(index)
}

fn select(index: &Index, query: &str, options: &SelectOptions) -> Result<Records> {
    let mut records = Records::open(RecordUnit::Document, RecordUnit::None, 0)?;
    index.select(query, &mut records, Operator::Or, options)?;
    Ok(records)
}

#[test]
fn test_near_window_on_document_positions() -> Result<()> {
    let index = Index::create(IndexConfig::in_memory())?;
    index.upd(b"pets", None, Some("cat dog x y z cat"))?;

    let near = |d| SelectOptions::new(SelectMode::Near).with_max_interval(d);
    assert_eq!(select(&index, "cat dog", &near(2))?.find(b"pets"), 1);
    assert!(select(&index, "cat dog", &near(0))?.is_empty());
    assert_eq!(select(&index, "dog cat", &near(1))?.nhits(), 1);
    Ok(())
}

#[test]
fn test_near_hits_grow_with_interval() -> Result<()> {
    let docs = documents(7, 150);
    let index = build(IndexConfig::in_memory(), &docs)?;
    for query in ["search engine", "query term phrase", "chunk buffer"] {
        let mut last = 0;
        for interval in 0..8 {
            let options = SelectOptions::new(SelectMode::Near).with_max_interval(interval);
            let n = select(&index, query, &options)?.nhits();
            assert!(n >= last, "{query}: {n} hits at {interval}, {last} before");
            last = n;
        }
    }
    Ok(())
}

#[test]
fn test_phrase_hits_are_near_hits() -> Result<()> {
    let docs = documents(11, 150);
    let index = build(IndexConfig::in_memory(), &docs)?;
    let near2 = SelectOptions::new(SelectMode::Near2).with_max_interval(0);
    for query in ["index query", "near score chunk"] {
        let mut phrase = select(&index, query, &SelectOptions::default())?;
        let near = select(&index, query, &near2)?;
        assert!(near.nhits() >= phrase.nhits());
        while let Some(record) = phrase.next() {
            assert!(near.record(record.key).is_some());
        }
    }
    Ok(())
}

#[test]
fn test_boolean_composition() -> Result<()> {
    let index = Index::create(IndexConfig::in_memory())?;
    index.upd(b"a", None, Some("red green"))?;
    index.upd(b"b", None, Some("green blue"))?;
    index.upd(b"c", None, Some("blue red"))?;
    index.upd(b"d", None, Some("yellow"))?;
    let exact = SelectOptions::default();

    let mut records = select(&index, "red", &exact)?;
    index.select("blue", &mut records, Operator::Or, &exact)?;
    assert_eq!(records.nhits(), 3);
    index.select("green", &mut records, Operator::And, &exact)?;
    assert_eq!(records.nhits(), 2);
    index.select("blue", &mut records, Operator::But, &exact)?;
    assert_eq!(records.nhits(), 1);
    assert_eq!(records.find(b"a"), 2);

    let mut reds = select(&index, "red", &exact)?;
    let blues = select(&index, "blue", &exact)?;
    let mut both = select(&index, "red", &exact)?;
    both.intersect(select(&index, "blue", &exact)?)?;
    assert_eq!(both.nhits(), 1);
    assert!(both.find(b"c") > 0);

    let mut only_blue = select(&index, "blue", &exact)?;
    let common = reds.difference(&mut only_blue)?;
    assert_eq!(common, 1);
    assert_eq!((reds.nhits(), only_blue.nhits()), (1, 1));

    reds.union(blues)?;
    assert_eq!(reds.nhits(), 3);
    reds.subtract(select(&index, "green", &exact)?)?;
    assert_eq!(reds.nhits(), 1);
    Ok(())
}

fn keys_of(records: &mut Records) -> BTreeSet<Vec<u8>> {
    records.rewind();
    let mut keys = BTreeSet::new();
    while records.next().is_some() {
        keys.extend(records.curr_key());
    }
    keys
}

#[test]
fn test_boolean_identities() -> Result<()> {
    let docs = documents(23, 200);
    let index = build(IndexConfig::in_memory(), &docs)?;
    let exact = SelectOptions::default();

    for (a, b) in [("search", "engine"), ("index query", "term"), ("chunk", "buffer near")] {
        let mut only_a = select(&index, a, &exact)?;
        assert!(!only_a.is_empty(), "{a} matched nothing");

        // (A AND B) OR (A BUT B) == A
        let mut a_and_b = select(&index, a, &exact)?;
        index.select(b, &mut a_and_b, Operator::And, &exact)?;
        let mut a_but_b = select(&index, a, &exact)?;
        index.select(b, &mut a_but_b, Operator::But, &exact)?;
        assert!(keys_of(&mut a_and_b).is_disjoint(&keys_of(&mut a_but_b)));
        a_and_b.union(a_but_b)?;
        assert_eq!(keys_of(&mut a_and_b), keys_of(&mut only_a), "{a} / {b}");

        let mut a_but_a = select(&index, a, &exact)?;
        index.select(a, &mut a_but_a, Operator::But, &exact)?;
        assert!(a_but_a.is_empty(), "{a} BUT {a}");

        let mut a_or_b = select(&index, a, &exact)?;
        index.select(b, &mut a_or_b, Operator::Or, &exact)?;
        let mut b_or_a = select(&index, b, &exact)?;
        index.select(a, &mut b_or_a, Operator::Or, &exact)?;
        assert_eq!(keys_of(&mut a_or_b), keys_of(&mut b_or_a), "{a} OR {b}");
    }
    Ok(())
}

#[test]
fn test_escalation_only_adds_hits() -> Result<()> {
    let docs = vec![
        "full text search".to_string(),
        "fulltext searching".to_string(),
        "textbook research".to_string(),
        "unrelated words".to_string(),
    ];
    let narrow = build(IndexConfig::in_memory(), &docs)?;
    let broad = build(IndexConfig::in_memory().with_escalation_threshold(10), &docs)?;

    for query in ["text", "search", "full text", "book", "nothing"] {
        let n = narrow.sel(query)?.map_or(0, |r| r.nhits());
        let b = broad.sel(query)?.map_or(0, |r| r.nhits());
        assert!(b >= n, "{query}: {b} < {n}");
    }
    assert_eq!(narrow.sel("text")?.map(|r| r.nhits()), Some(1));
    assert_eq!(broad.sel("text")?.map(|r| r.nhits()), Some(3));
    assert!(broad.sel("nothing")?.is_none());
    Ok(())
}

#[test]
fn test_sections_and_ranking() -> Result<()> {
    let index = Index::create(IndexConfig::in_memory())?;
    index.update(b"title-hit", 1, None, Some(&Values::new().with("rust search", 10)))?;
    index.update(b"body-hit", 2, None, Some(&Values::from("a search about rust and search")))?;
    index.update(b"miss", 1, None, Some(&Values::from("nothing relevant")))?;

    let mut records = select(&index, "search", &SelectOptions::default())?;
    records.sort(10, SortOrder::Descending)?;
    assert_eq!(records.next().map(|r| r.score), Some(11));
    assert_eq!(records.curr_key().as_deref(), Some(&b"title-hit"[..]));
    assert_eq!(records.next().map(|r| r.score), Some(2));
    assert!(records.next().is_none());

    let mut sections = Records::open(RecordUnit::Section, RecordUnit::None, 0)?;
    index.select("rust", &mut sections, Operator::Or, &SelectOptions::default())?;
    assert_eq!(sections.nhits(), 2);
    assert!(sections.at(b"body-hit", 2, 0).is_some());
    assert!(sections.at(b"body-hit", 1, 0).is_none());
    Ok(())
}
