//! Unit tests for hierarchical cache keys, matchers, and filters.

use tasksync::cache::{KeyMatcher, KeySegment, QueryFilter, QueryKey};
use tasksync::query_key;

#[test]
fn macro_builds_mixed_segments() {
    let key = query_key!["calendar-tasks", 7_i64, "Personal Tasks"];
    assert_eq!(
        key.segments(),
        &[
            KeySegment::Text("calendar-tasks".into()),
            KeySegment::Int(7),
            KeySegment::Text("Personal Tasks".into()),
        ]
    );
}

#[test]
fn key_is_prefix_of_itself_and_extensions() {
    let root = QueryKey::new("project-tasks");
    let child = root.clone().with(3_i64);

    assert!(root.starts_with(&root));
    assert!(child.starts_with(&root));
    assert!(!root.starts_with(&child));
}

#[test]
fn prefix_filter_does_not_match_sibling_roots() {
    let filter = QueryFilter::prefix(QueryKey::new("task"));
    assert!(filter.matches(&query_key!["task", 1_i64]));
    assert!(!filter.matches(&query_key!["tasks", 1_i64]));
    assert!(!filter.matches(&query_key!["personal-tasks"]));
}

#[test]
fn exact_filter_matches_only_identical_key() {
    let filter = QueryFilter::exact(query_key!["task", 1_i64]);
    assert!(filter.matches(&query_key!["task", 1_i64]));
    assert!(!filter.matches(&query_key!["task", 1_i64, "comments"]));
    assert!(!filter.matches(&query_key!["task"]));
}

/// The trailing-label matcher inspects the final segment only.
#[test]
fn trailing_label_matches_final_text_segment() {
    let matcher = KeyMatcher::trailing_label("Personal Tasks");
    assert!(matcher.matches(&query_key!["calendar-tasks", 7_i64, "Personal Tasks"]));
    assert!(!matcher.matches(&query_key!["calendar-tasks", 7_i64, "Team Alpha"]));
    assert!(!matcher.matches(&query_key!["Personal Tasks", 7_i64]));
}

#[test]
fn segment_eq_compares_position() {
    let matcher = KeyMatcher::segment_eq(1, 7_i64);
    assert!(matcher.matches(&query_key!["calendar-tasks", 7_i64, "x"]));
    assert!(!matcher.matches(&query_key!["calendar-tasks", 8_i64, "x"]));
    assert!(!matcher.matches(&query_key!["calendar-tasks"]));
}

#[test]
fn filter_predicate_narrows_prefix_match() {
    let filter = QueryFilter::prefix(QueryKey::new("calendar-tasks"))
        .with_predicate(KeyMatcher::trailing_label("Personal Tasks"));

    assert!(filter.matches(&query_key!["calendar-tasks", 1_i64, "Personal Tasks"]));
    assert!(!filter.matches(&query_key!["calendar-tasks", 1_i64, "Team"]));
    assert!(!filter.matches(&query_key!["projects", "Personal Tasks"]));
}

#[test]
fn custom_matcher_sees_full_tuple() {
    let matcher = KeyMatcher::new(|key| key.segments().len() == 2);
    assert!(matcher.matches(&query_key!["a", "b"]));
    assert!(!matcher.matches(&query_key!["a"]));
}

#[test]
fn display_renders_bracketed_tuple() {
    let key = query_key!["calendar-tasks", 7_i64, "Personal Tasks"];
    assert_eq!(key.to_string(), r#"["calendar-tasks", 7, "Personal Tasks"]"#);
}

#[test]
fn key_serializes_as_json_array() {
    let key = query_key!["project-tasks", 3_i64];
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, r#"["project-tasks",3]"#);
    let back: QueryKey = serde_json::from_str(&json).unwrap();
    assert_eq!(back, key);
}
