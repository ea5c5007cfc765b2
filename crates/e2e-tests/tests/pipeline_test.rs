//! Full pipeline E2E tests for review-pulse.
//!
//! Verify the run-level properties every theme run must satisfy: bounded
//! theme count, a single theme per review, duplicate fidelity and the
//! small-input scenario.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;

use e2e_tests::{
    assignments, axis, run, seven_blobs, test_config, Fixture, SampleLabeler,
};
use pulse_themes::{Theme, MISCELLANEOUS_LABEL};
use pulse_types::ThemeId;

#[test]
fn test_theme_count_bounded_and_miscellaneous_present() {
    let fixture = seven_blobs(7);
    for k in [0usize, 1, 3, 5, 10] {
        let labeler = SampleLabeler::default();
        let store = run(test_config(k), &fixture, Box::new(labeler.clone())).unwrap();

        let named = store
            .themes()
            .iter()
            .filter(|t| matches!(t, Theme::Named(_)))
            .count();
        assert!(named <= k, "K={} produced {} named themes", k, named);
        assert_eq!(labeler.calls(), named, "one labeler call per named theme");
        assert!(
            store.theme(ThemeId::Miscellaneous).is_some(),
            "miscellaneous missing for K={}",
            k
        );
        assert_eq!(store.label_of(ThemeId::Miscellaneous), Some(MISCELLANEOUS_LABEL));
    }
}

#[test]
fn test_every_review_gets_exactly_one_theme() {
    let mut fixture = seven_blobs(11);
    // Opposite the jitter axis: farther from every blob than blobs are apart
    let mut stray = vec![0.0; 8];
    stray[7] = -1.0;
    fixture.push("stray", "where do i find the tax report", Some(stray));
    fixture.push("no-vector", "screen goes blank after login", None);

    let store = run(test_config(5), &fixture, Box::new(SampleLabeler::default())).unwrap();

    let mut seen = BTreeSet::new();
    for theme in store.themes() {
        for member in theme.members() {
            assert!(seen.insert(member.clone()), "{} in two themes", member);
        }
    }

    let representatives: BTreeSet<String> = store
        .reviews()
        .iter()
        .filter(|r| store.duplicate_of(&r.review_id).is_none())
        .map(|r| r.review_id.clone())
        .collect();
    assert_eq!(seen, representatives);

    assert_eq!(assignments(&store).len(), fixture.reviews.len());
    assert_eq!(store.theme_of("no-vector"), Some(ThemeId::Miscellaneous));
    assert_eq!(store.theme_of("stray"), Some(ThemeId::Miscellaneous));
}

#[test]
fn test_theme_counts_include_duplicates() {
    let mut fixture = seven_blobs(3);
    let original = fixture.reviews[0].clone();
    fixture.push("copy-1", &format!("{}!", original.content), None);
    fixture.push("copy-2", &original.content.to_uppercase(), None);

    let store = run(test_config(5), &fixture, Box::new(SampleLabeler::default())).unwrap();

    assert_eq!(store.stats().duplicates, 2);
    assert_eq!(
        store.duplicate_of("copy-1").map(String::as_str),
        Some(original.review_id.as_str())
    );

    let theme = store.theme_of(&original.review_id).unwrap();
    assert_eq!(store.theme_of("copy-2"), Some(theme));
    assert_eq!(
        store.review_count(theme),
        store.representative_count(theme) + 2
    );

    let total: usize = store.theme_counts().iter().map(|(_, count)| count).sum();
    assert_eq!(total, fixture.reviews.len());
}

#[test]
fn test_four_reviews_land_in_miscellaneous() {
    let mut fixture = Fixture::default();
    fixture.push("r1", "otp never arrives", Some(axis(4, 0)));
    fixture.push("r2", "charges are too high", Some(axis(4, 1)));
    fixture.push("r3", "charts freeze on open", Some(axis(4, 2)));
    fixture.push("r4", "kyc stuck in review", Some(axis(4, 3)));

    let labeler = SampleLabeler::default();
    let store = run(test_config(5), &fixture, Box::new(labeler.clone())).unwrap();

    assert_eq!(labeler.calls(), 0);
    assert_eq!(store.themes().len(), 1);
    assert_eq!(store.review_count(ThemeId::Miscellaneous), 4);
    assert_eq!(store.stats().raw_clusters, 0);
    for id in ["r1", "r2", "r3", "r4"] {
        assert_eq!(store.theme_of(id), Some(ThemeId::Miscellaneous));
    }
}

#[test]
fn test_great_app_duplicates_collapse() {
    let mut fixture = Fixture::default();
    fixture.push("r1", "Great app", None);
    fixture.push("r2", "great app!!", None);
    fixture.push("r3", "GREAT  APP", None);
    fixture.push("r4", "great apps", None);

    let store = run(test_config(5), &fixture, Box::new(SampleLabeler::default())).unwrap();

    assert_eq!(store.stats().representatives, 1);
    assert_eq!(store.stats().duplicates, 3);
    // "great apps" has the longest canonical text
    for id in ["r1", "r2", "r3"] {
        assert_eq!(store.duplicate_of(id).map(String::as_str), Some("r4"));
    }
    assert_eq!(store.review_count(ThemeId::Miscellaneous), 4);
}
