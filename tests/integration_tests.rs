//! Integration tests for Citation Master
//!
//! These tests run whole analyses against small in-memory libraries.

use citation_master::config::Config;
use citation_master::engine::{Analyzer, CitationAssigner, ClaimOutcome, EngineError};
use citation_master::library::{BibliographyResolver, Library, LibraryError};
use citation_master::models::{CitationStyle, MetadataBuilder, PageText, WorkId};
use citation_master::oracle::{GuardedOracle, MockOracle};
use citation_master::utils::{format_reference, in_text};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const MANUSCRIPT: &str = "Oceans absorb excess heat. Trees absorb carbon dioxide. \
Oceans absorb heat from the atmosphere.";

fn two_work_library() -> Library {
    let mut library = Library::new();
    library
        .add_work(
            MetadataBuilder::new("Forest carbon").author("Smith").year("2020").build(),
            &[PageText::new(1, "Trees sequester carbon at rate X")],
        )
        .unwrap();
    library
        .add_work(
            MetadataBuilder::new("Ocean heat").author("Lee").year("2019").build(),
            &[PageText::new(3, "Oceans absorb excess heat from the atmosphere")],
        )
        .unwrap();
    library
}

fn smith_library() -> Library {
    let mut library = Library::new();
    library
        .add_work(
            MetadataBuilder::new("Forest carbon").author("Smith").year("2020").build(),
            &[PageText::new(1, "Trees sequester carbon at rate X")],
        )
        .unwrap();
    library
}

fn offline(library: &Library) -> Analyzer {
    Analyzer::new(library.snapshot(), &Config::default())
}

#[tokio::test]
async fn test_apa_single_source_example() {
    let report = offline(&smith_library())
        .analyze("Trees absorb carbon dioxide.", CitationStyle::Apa, None)
        .await
        .unwrap();

    assert_eq!(report.citations.len(), 1);
    assert_eq!(report.citations[0].in_text_form, "(Smith, 2020)");
    assert!(report.rendered.starts_with("Trees absorb carbon dioxide (Smith, 2020)."));
    assert_eq!(report.references.entries[0].text, "Smith. (2020). Forest carbon.");
    assert!(report.claims[0].candidates[0].passage.text.contains("sequester"));
}

#[tokio::test]
async fn test_ieee_single_source_example() {
    let report = offline(&smith_library())
        .analyze("Trees absorb carbon dioxide.", CitationStyle::Ieee, None)
        .await
        .unwrap();

    assert!(report.rendered.starts_with("Trees absorb carbon dioxide [1]."));
    assert!(report.rendered.contains("\n[1] Smith, "));
    assert_eq!(report.references.entries[0].number, Some(1));
}

#[tokio::test]
async fn test_numeric_keys_follow_first_appearance() {
    let report = offline(&two_work_library())
        .analyze(MANUSCRIPT, CitationStyle::Ieee, None)
        .await
        .unwrap();

    let forms: Vec<&str> = report.citations.iter().map(|c| c.in_text_form.as_str()).collect();
    assert_eq!(forms, vec!["[1]", "[2]", "[1]"]);
    assert_eq!(report.stats.sources_used, 2);
    assert!(report.rendered.starts_with(
        "Oceans absorb excess heat [1]. Trees absorb carbon dioxide [2]. \
Oceans absorb heat from the atmosphere [1]."
    ));
}

#[tokio::test]
async fn test_removing_first_citation_renumbers_densely() {
    let report = offline(&two_work_library())
        .analyze(MANUSCRIPT, CitationStyle::Ieee, None)
        .await
        .unwrap();

    let first = report.citations[0].claim;
    let mut assigner = CitationAssigner::from_state(report.session, Config::default().citations);
    assigner.restyle(CitationStyle::Ieee);
    assigner.remove(first).unwrap();

    let numbers: Vec<Option<usize>> = assigner.citations().iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![Some(1), Some(2)]);
    let references = assigner.reference_list();
    let listed: Vec<Option<usize>> = references.entries.iter().map(|e| e.number).collect();
    assert_eq!(listed, vec![Some(1), Some(2)]);

    assert!(matches!(assigner.remove(first), Err(EngineError::UnknownClaim(_))));
}

#[tokio::test]
async fn test_no_orphan_references_in_any_style() {
    let library = two_work_library();
    for style in CitationStyle::all() {
        let report = offline(&library).analyze(MANUSCRIPT, style, None).await.unwrap();

        let cited: BTreeSet<WorkId> = report.citations.iter().map(|c| c.work.work_id.clone()).collect();
        let listed: BTreeSet<WorkId> = report.references.entries.iter().map(|e| e.work_id.clone()).collect();
        assert_eq!(cited, listed, "style {}", style);
        assert_eq!(report.references.len(), listed.len(), "style {}", style);
    }
}

#[tokio::test]
async fn test_failing_oracle_degrades_gracefully() {
    let mock = Arc::new(MockOracle::new().failing());
    let oracle = GuardedOracle::new(mock.clone(), Duration::from_millis(200), 2);
    let report = offline(&two_work_library())
        .with_oracle(Some(oracle))
        .analyze(MANUSCRIPT, CitationStyle::Apa, None)
        .await
        .unwrap();

    assert_eq!(report.stats.claims_identified, 3);
    assert_eq!(report.stats.citations_added, 3);
    assert_eq!(report.stats.degraded_claims, 3);
    assert!(report.claims.iter().all(|c| c.candidates.iter().all(|cand| cand.degraded)));
    assert!(mock.call_count() >= 1);
}

#[tokio::test]
async fn test_oracle_scores_drive_selection() {
    let mock = MockOracle::new().with_score("sequester", 0.95).with_default_score(0.0);
    let oracle = GuardedOracle::new(Arc::new(mock), Duration::from_secs(1), 3);
    let report = offline(&two_work_library())
        .with_oracle(Some(oracle))
        .analyze(MANUSCRIPT, CitationStyle::Apa, None)
        .await
        .unwrap();

    let outcomes: Vec<&ClaimOutcome> = report.claims.iter().map(|c| &c.outcome).collect();
    assert_eq!(outcomes[0], &ClaimOutcome::NoCandidatesFound);
    assert!(matches!(outcomes[1], ClaimOutcome::Cited { .. }));
    assert_eq!(outcomes[2], &ClaimOutcome::NoCandidatesFound);
    assert_eq!(report.stats.uncited, 2);
    assert_eq!(report.stats.degraded_claims, 0);
    assert_eq!(report.citations[0].relevance, 0.95);
}

#[tokio::test]
async fn test_analysis_requires_indexed_library() {
    let err = offline(&Library::new())
        .analyze(MANUSCRIPT, CitationStyle::Apa, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Library(LibraryError::NotIndexed)));
}

#[tokio::test]
async fn test_rerun_replaces_reference_section() {
    let analyzer = offline(&smith_library());
    let first = analyzer
        .analyze("Trees absorb carbon dioxide.", CitationStyle::Apa, None)
        .await
        .unwrap();

    // A rerun over output whose reference section is already present
    let with_refs = format!("Trees absorb carbon dioxide.\n\n{}", first.references.render());
    let second = analyzer
        .analyze(&with_refs, CitationStyle::Apa, Some(first.session.clone()))
        .await
        .unwrap();
    assert_eq!(second.rendered, first.rendered);
    assert_eq!(second.rendered.matches("References").count(), 1);
}

#[tokio::test]
async fn test_rerun_on_rendered_output_keeps_and_restyles_citations() {
    let library = two_work_library();
    let first = offline(&library)
        .analyze(MANUSCRIPT, CitationStyle::Ieee, None)
        .await
        .unwrap();

    let again = offline(&library)
        .analyze(&first.rendered, CitationStyle::Ieee, Some(first.session.clone()))
        .await
        .unwrap();
    assert_eq!(again.rendered, first.rendered);
    assert_eq!(again.stats.citations_reused, 3);
    assert_eq!(again.references.len(), 2);
    assert!(again.dropped.is_empty());

    let restyled = offline(&library)
        .analyze(&first.rendered, CitationStyle::Apa, Some(first.session))
        .await
        .unwrap();
    assert!(restyled.rendered.starts_with(
        "Oceans absorb excess heat (Lee, 2019). Trees absorb carbon dioxide (Smith, 2020). \
Oceans absorb heat from the atmosphere (Lee, 2019)."
    ));
    assert!(!restyled.rendered.contains("[1]"));
    assert_eq!(restyled.references.len(), 2);
}

#[tokio::test]
async fn test_slow_oracle_degrades_gracefully() {
    let slow = MockOracle::new()
        .with_default_score(0.9)
        .with_delay(Duration::from_millis(200));
    let oracle = GuardedOracle::new(Arc::new(slow), Duration::from_millis(20), 2);
    let report = offline(&two_work_library())
        .with_oracle(Some(oracle))
        .analyze(MANUSCRIPT, CitationStyle::Ieee, None)
        .await
        .unwrap();

    assert_eq!(report.stats.citations_added, 3);
    assert_eq!(report.stats.degraded_claims, 3);
    let forms: Vec<&str> = report.citations.iter().map(|c| c.in_text_form.as_str()).collect();
    assert_eq!(forms, vec!["[1]", "[2]", "[1]"]);
}

#[tokio::test]
async fn test_offline_run_cites_weak_lexical_match() {
    let mut library = Library::new();
    library
        .add_work(
            MetadataBuilder::new("Forest dynamics").author("Moreno").year("2018").build(),
            &[PageText::new(
                12,
                "Mature stands continue to accumulate biomass for centuries after disturbance. \
                 Soil organic matter in temperate forests grows slowly but steadily over time. \
                 Our plots in the Pacific Northwest were resampled every five years. \
                 Net ecosystem exchange stayed positive in most old growth sites, so mature stands \
                 remain sinks for atmospheric carbon.",
            )],
        )
        .unwrap();

    let report = offline(&library)
        .analyze("Old forests keep absorbing carbon.", CitationStyle::Apa, None)
        .await
        .unwrap();
    assert_eq!(report.stats.degraded_claims, 1);
    assert_eq!(report.citations.len(), 1);
    assert!(report
        .rendered
        .starts_with("Old forests keep absorbing carbon (Moreno, 2018)."));
}

#[test]
fn test_venue_capitalization_merges_and_year_splits() {
    let mut resolver = BibliographyResolver::new();
    let a = resolver
        .resolve(
            MetadataBuilder::new("Forest carbon sinks")
                .author("Smith, John")
                .year("2020")
                .container("Journal of Ecology")
                .build(),
        )
        .unwrap();
    let b = resolver
        .resolve(
            MetadataBuilder::new("Forest Carbon Sinks")
                .author("Smith, John")
                .year("2020")
                .container("JOURNAL OF ECOLOGY")
                .build(),
        )
        .unwrap();
    let c = resolver
        .resolve(
            MetadataBuilder::new("Forest carbon sinks")
                .author("Smith, John")
                .year("2021")
                .container("Journal of Ecology")
                .build(),
        )
        .unwrap();

    assert_eq!(a.work_id, b.work_id);
    assert_ne!(a.work_id, c.work_id);
    assert_eq!(resolver.len(), 2);
}

#[test]
fn test_resolving_a_work_again_is_stable() {
    let mut resolver = BibliographyResolver::new();
    let work = resolver
        .resolve(MetadataBuilder::new("Ocean heat").author("Lee, Ann").year("2019").build())
        .unwrap();
    let again = resolver.resolve(work.to_raw()).unwrap();
    assert_eq!(work.work_id, again.work_id);
    assert_eq!(resolver.len(), 1);
}

#[test]
fn test_formatting_is_pure() {
    let library = smith_library();
    let work = library.works().next().unwrap();
    for style in CitationStyle::all() {
        assert_eq!(format_reference(work, style), format_reference(work, style));
        assert_eq!(
            in_text(work, style, Some("4"), Some(1), None),
            in_text(work, style, Some("4"), Some(1), None)
        );
    }
    assert_eq!(in_text(work, CitationStyle::Ieee, None, Some(3), None), "[3]");
}

#[tokio::test]
async fn test_library_survives_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.json");
    two_work_library().save(&path).unwrap();

    let loaded = Library::load(&path).unwrap();
    let original = offline(&two_work_library())
        .analyze(MANUSCRIPT, CitationStyle::Chicago, None)
        .await
        .unwrap();
    let reloaded = offline(&loaded)
        .analyze(MANUSCRIPT, CitationStyle::Chicago, None)
        .await
        .unwrap();
    assert_eq!(original.rendered, reloaded.rendered);
}
