//! Recommendation scenarios with a fixed catalog and table-driven embeddings.

mod common;

use std::sync::Arc;

use common::{at_cosine, test_config, Identity, Labeler, TableEmbedder, Truncator};
use precis::{
    Catalog, CatalogEntry, EngineConfig, MemoryStore, Mode, PreferenceExtractor, Recommender,
    Records, Request, Summarizer,
};

const USER: &str = "7";

fn entry(title: &str, category: &str, description: &str) -> CatalogEntry {
    CatalogEntry {
        title: title.into(),
        authors: format!("{title} Author"),
        description: description.into(),
        category: category.into(),
    }
}

/// Two sea books and a cookbook, the weaker match first.
fn catalog() -> Catalog {
    Catalog::from_entries([
        entry("Storm Coast", "Sea stories", "desc b"),
        entry("Kitchen", "Cooking", "desc c"),
        entry("Whale Road", "Sea adventures", "desc a"),
    ])
    .unwrap()
}

fn embedder() -> TableEmbedder {
    TableEmbedder::default()
        .with("sea please", [1.0, 0.0])
        .with("desc hist.", [0.0, 1.0])
        .with("desc a", at_cosine(0.8))
        .with("desc b", at_cosine(0.3))
        .with("desc c", [1.0, 0.0])
}

fn recommender(config: &EngineConfig) -> Recommender<MemoryStore> {
    let classification = Arc::new(Labeler {
        label: "novel",
        tags: "Sea",
    });
    let summarizer = Arc::new(
        Summarizer::new(Arc::new(Truncator::default()), classification.clone(), config).unwrap(),
    );
    let extractor = Arc::new(PreferenceExtractor::new(
        Arc::new(Identity),
        classification,
        summarizer,
        config,
    ));
    Recommender::new(
        Arc::new(Records::new(MemoryStore::new())),
        extractor,
        Arc::new(embedder()),
        Arc::new(catalog()),
        config,
    )
}

fn titles(recs: &[precis::Recommendation]) -> Vec<&str> {
    recs.iter().map(|r| r.title.as_str()).collect()
}

#[test]
fn input_mode_ranks_matching_books_by_score() {
    let recommender = recommender(&test_config());
    let recs = recommender
        .recommend(USER, &Request::new(Mode::Input { text: "sea please".into() }))
        .unwrap();

    assert_eq!(titles(&recs), ["Whale Road", "Storm Coast"]);
    assert!((recs[0].score - 0.8).abs() < 1e-5);
    assert!((recs[1].score - 0.3).abs() < 1e-5);
    assert_eq!(recs[0].authors, "Whale Road Author");
}

#[test]
fn history_is_recorded_and_excluded() {
    let recommender = recommender(&test_config());
    let request = Request::new(Mode::Input { text: "sea please".into() });

    assert_eq!(recommender.recommend(USER, &request).unwrap().len(), 2);
    assert!(recommender.recommend(USER, &request).unwrap().is_empty());

    let again = Request {
        exclude_history: false,
        ..request
    };
    assert_eq!(recommender.recommend(USER, &again).unwrap().len(), 2);
}

#[test]
fn history_mode_scores_against_compressed_description() {
    let recommender = recommender(&test_config());
    let recs = recommender
        .recommend(
            USER,
            &Request::new(Mode::History {
                description: "desc hist".into(),
            }),
        )
        .unwrap();
    assert_eq!(titles(&recs), ["Storm Coast", "Whale Road"]);
}

#[test]
fn combined_mode_takes_the_better_score() {
    let recommender = recommender(&test_config());
    let recs = recommender
        .recommend(
            USER,
            &Request::new(Mode::Combined {
                text: "sea please".into(),
                description: "desc hist".into(),
            }),
        )
        .unwrap();

    assert_eq!(titles(&recs), ["Storm Coast", "Whale Road"]);
    assert!((recs[0].score - at_cosine(0.3)[1]).abs() < 1e-5);
    assert!((recs[1].score - 0.8).abs() < 1e-5);
}

#[test]
fn seeded_sampling_is_reproducible() {
    let config = EngineConfig {
        candidate_cap: 1,
        ..test_config()
    };
    let recommender = recommender(&config);
    let request = Request {
        mode: Mode::Input { text: "sea please".into() },
        exclude_history: false,
        request_id: Some("req-1".into()),
    };

    let first = recommender.recommend(USER, &request).unwrap();
    let second = recommender.recommend(USER, &request).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(titles(&first), titles(&second));
}

#[test]
fn top_k_limits_results() {
    let config = EngineConfig {
        top_k: 1,
        ..test_config()
    };
    let recs = recommender(&config)
        .recommend(USER, &Request::new(Mode::Input { text: "sea please".into() }))
        .unwrap();
    assert_eq!(titles(&recs), ["Whale Road"]);
}
