// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn insert_then_contains() {
    let mut filter = BloomFilter::new(1000, 0.01);
    assert!(!filter.contains("https://example.com/a"));
    assert!(filter.insert("https://example.com/a"));
    assert!(filter.contains("https://example.com/a"));
}

#[test]
fn duplicate_insert_reports_not_new() {
    let mut filter = BloomFilter::new(1000, 0.01);
    assert!(filter.insert("url"));
    assert!(!filter.insert("url"));
    assert_eq!(filter.inserted(), 1);
}

#[test]
fn no_false_negatives() {
    let mut filter = BloomFilter::new(10_000, 0.01);
    let urls: Vec<String> = (0..5_000).map(|i| format!("https://example.com/page/{i}")).collect();
    for url in &urls {
        filter.insert(url);
    }
    for url in &urls {
        assert!(filter.contains(url), "bloom filters must never forget {url}");
    }
}

#[test]
fn false_positive_rate_is_roughly_bounded() {
    let mut filter = BloomFilter::new(10_000, 0.01);
    for i in 0..10_000 {
        filter.insert(&format!("in-{i}"));
    }
    let false_positives =
        (0..10_000).filter(|i| filter.contains(&format!("out-{i}"))).count();
    // Target 1%; allow generous slack for hash variance.
    assert!(false_positives < 500, "{false_positives} false positives out of 10k");
}

#[test]
fn dedup_filters_are_per_project() {
    let filters = DedupFilters::new(1000, 0.01);
    assert!(filters.check_and_add("p1", "https://a/"));
    assert!(!filters.check_and_add("p1", "https://a/"));
    // Same URL, different project: independent filter.
    assert!(filters.check_and_add("p2", "https://a/"));
}

#[test]
fn clear_resets_a_project_filter() {
    let filters = DedupFilters::new(1000, 0.01);
    filters.check_and_add("p1", "https://a/");
    assert!(filters.contains("p1", "https://a/"));
    filters.clear("p1");
    assert!(!filters.contains("p1", "https://a/"));
    assert!(filters.check_and_add("p1", "https://a/"));
}
