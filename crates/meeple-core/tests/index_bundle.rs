//! Integration tests for building, persisting and reloading index bundles.

use meeple_core::bundle::{LEXICAL_ARTIFACT, VECTOR_ARTIFACT};
use meeple_core::corpus::read_corpus_jsonl;
use meeple_core::embed::embedder_for_model;
use meeple_core::lexical::{Bm25, Bm25Params};
use meeple_core::tokenize::tokenize;
use meeple_core::vector::l2_normalize;
use meeple_core::{Document, ErrorCode, HashingEmbedder, IndexBuilder, IndexBundle};
use proptest::prelude::*;
use std::fs;

const CORPUS: &str = r#"{"doc_id":"G000","name":"Catan","text":"Catan blends Trading, Dice Rolling within a family frame. negotiation yields flexible exchanges and alliances"}
{"doc_id":"G001","name":"Dominion","text":"Dominion blends Deck Building within a card game frame. players construct engines from a shared market"}
{"doc_id":"G002","name":"Avalon","text":"Avalon blends Hidden Roles within a bluffing frame. social deduction and table talk drive decisions"}
{"doc_id":"G003","name":"Agricola","text":"Agricola blends Worker Placement within a eurogame frame. actions are scarce; turn order tension matters"}
"#;

fn corpus_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("corpus.jsonl");
    fs::write(&path, CORPUS).expect("write corpus");
    path
}

#[test]
fn built_bundle_survives_a_disk_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir must be created");
    let docs = read_corpus_jsonl(&corpus_file(dir.path())).expect("read corpus");

    let embedder = HashingEmbedder::new(64).expect("embedder");
    let built = IndexBuilder::new(&embedder).build(&docs).expect("build");
    let out = dir.path().join("indices");
    built.save(&out).expect("save");

    assert!(out.join(LEXICAL_ARTIFACT).is_file());
    assert!(out.join(VECTOR_ARTIFACT).is_file());

    let loaded = IndexBundle::load(&out).expect("load");
    let query = tokenize("dice trading");
    assert_eq!(
        loaded.lexical.score_all(&query),
        built.lexical.score_all(&query)
    );

    let rebuilt = embedder_for_model(loaded.vector.model()).expect("model");
    let q = l2_normalize(&rebuilt.embed("dice trading").expect("embed"));
    assert_eq!(
        loaded.vector.search(&q, 4).expect("search"),
        built.vector.search(&q, 4).expect("search")
    );
}

#[test]
fn artifacts_from_different_corpora_do_not_load() {
    let dir = tempfile::tempdir().expect("tempdir must be created");
    let embedder = HashingEmbedder::new(16).expect("embedder");

    let first = vec![Document::new("A", "dice"), Document::new("B", "cards")];
    let second = vec![Document::new("A", "dice"), Document::new("B", "tiles")];

    let a = dir.path().join("a");
    let b = dir.path().join("b");
    IndexBuilder::new(&embedder)
        .build(&first)
        .expect("build")
        .save(&a)
        .expect("save");
    IndexBuilder::new(&embedder)
        .build(&second)
        .expect("build")
        .save(&b)
        .expect("save");

    fs::copy(b.join(VECTOR_ARTIFACT), a.join(VECTOR_ARTIFACT)).expect("swap vector artifact");

    let err = IndexBundle::load(&a).expect_err("mixed bundle must not load");
    assert_eq!(err.code(), ErrorCode::IndexInconsistent);
}

#[test]
fn vector_artifact_records_model_and_unit_vectors() {
    let dir = tempfile::tempdir().expect("tempdir must be created");
    let docs = read_corpus_jsonl(&corpus_file(dir.path())).expect("read corpus");
    let embedder = HashingEmbedder::new(32).expect("embedder");
    IndexBuilder::new(&embedder)
        .build(&docs)
        .expect("build")
        .save(dir.path())
        .expect("save");

    let raw: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join(VECTOR_ARTIFACT)).expect("read"))
            .expect("json");
    assert_eq!(raw["model"], "hashing-v1-32");
    assert_eq!(raw["dimension"], 32);
    assert_eq!(raw["doc_ids"][2], "G002");

    let first: Vec<f64> = raw["vectors"][0]
        .as_array()
        .expect("vector row")
        .iter()
        .map(|v| v.as_f64().expect("number"))
        .collect();
    let norm = first.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

fn arb_docs() -> impl Strategy<Value = Vec<Vec<String>>> {
    let word = prop::sample::select(vec![
        "dice", "deck", "trading", "worker", "tile", "roles", "market", "engine",
    ]);
    prop::collection::vec(
        prop::collection::vec(word.prop_map(String::from), 0..8),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bm25_scores_align_with_corpus(docs in arb_docs(), query in prop::collection::vec("[a-z]{1,8}", 0..4)) {
        let bm25 = Bm25::from_tokenized(&docs, Bm25Params::default());
        let scores = bm25.score_all(&query);
        prop_assert_eq!(scores.len(), docs.len());
        prop_assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn documents_without_query_terms_score_zero(docs in arb_docs()) {
        let bm25 = Bm25::from_tokenized(&docs, Bm25Params::default());
        let scores = bm25.score_all(&["dice"]);
        for (doc, score) in docs.iter().zip(&scores) {
            if !doc.iter().any(|t| t == "dice") {
                prop_assert!(score.abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn persisted_term_counts_reproduce_scores(docs in arb_docs()) {
        let bm25 = Bm25::from_tokenized(&docs, Bm25Params::default());
        let reloaded = Bm25::from_term_counts(bm25.term_counts().to_vec(), bm25.params());
        let query = ["dice", "market", "dice"];
        prop_assert_eq!(bm25.score_all(&query), reloaded.score_all(&query));
    }
}
