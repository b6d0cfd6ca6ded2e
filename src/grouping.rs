//! Grouping of filtered pull requests into label and author buckets.
//!
//! Buckets at every level partition their input: each record lands in
//! exactly one bucket, taken from the first matching key in the order the
//! keys were given. Records matching no key go to an "Other" bucket. Empty
//! buckets are left out.

use serde::Serialize;
use std::collections::HashSet;

use crate::colors::{string_to_color, DEFAULT_LABEL_COLOR};
use crate::github::types::{Label, PullRequest};

pub const ALL_KEY: &str = "__all__";
pub const OTHER_KEY: &str = "__other__";
pub const OTHER_AUTHORS_KEY: &str = "__other_authors__";
pub const OTHER_AUTHORS_OTHER_KEY: &str = "__other_authors_other__";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBucket {
  /// Stable identifier, unique within a grouping result
  pub key: String,
  /// Display name
  pub label: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<String>,
  pub records: Vec<PullRequest>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<GroupBucket>,
}

impl GroupBucket {
  fn new(key: String, label: impl Into<String>, records: Vec<PullRequest>) -> Self {
    Self {
      key,
      label: label.into(),
      color: None,
      avatar_url: None,
      records,
      children: Vec::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// How a label grouping key selects records.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelMatcher {
  /// `key` has no `:` and the catalog has `key:*` labels
  Prefix(String),
  Exact(String),
}

impl LabelMatcher {
  fn new(key: &str, catalog: &[Label]) -> Self {
    let prefix = format!("{}:", key);
    if !key.contains(':') && catalog.iter().any(|l| l.name.starts_with(&prefix)) {
      Self::Prefix(prefix)
    } else {
      Self::Exact(key.to_string())
    }
  }

  fn matches(&self, pr: &PullRequest) -> bool {
    match self {
      Self::Prefix(prefix) => pr.has_label_prefix(prefix),
      Self::Exact(name) => pr.has_label(name),
    }
  }
}

fn dedup_keys(keys: &[String]) -> Vec<&str> {
  let mut seen = HashSet::new();
  keys
    .iter()
    .map(|k| k.trim())
    .filter(|k| !k.is_empty() && seen.insert(*k))
    .collect()
}

/// Group records by the given label keys and author keys.
///
/// - labels only: one bucket per label key plus a top-level "Other"
/// - authors (with or without labels): one bucket per author plus
///   "Other Authors"; with label keys each author bucket is split again
///   by label with a per-author "Other"
/// - neither: a single "All" bucket
pub fn group_records(
  records: &[PullRequest],
  label_keys: &[String],
  author_keys: &[String],
  catalog: &[Label],
) -> Vec<GroupBucket> {
  let label_keys = dedup_keys(label_keys);
  let author_keys = dedup_keys(author_keys);

  if author_keys.is_empty() {
    if label_keys.is_empty() {
      return non_empty(vec![GroupBucket::new(
        ALL_KEY.to_string(),
        "All",
        records.to_vec(),
      )]);
    }
    return label_buckets(records, &label_keys, catalog, "", OTHER_KEY.to_string());
  }

  let mut author_records: Vec<Vec<PullRequest>> = vec![Vec::new(); author_keys.len()];
  let mut others = Vec::new();
  for pr in records {
    match author_keys.iter().position(|a| *a == pr.author.login) {
      Some(idx) => author_records[idx].push(pr.clone()),
      None => others.push(pr.clone()),
    }
  }

  let mut buckets: Vec<GroupBucket> = author_keys
    .iter()
    .zip(author_records)
    .map(|(login, records)| {
      let key = format!("author-{}", login);
      let children = nested(&records, &label_keys, catalog, &key, format!("{}-other", key));
      let mut bucket = GroupBucket::new(key, *login, records);
      bucket.avatar_url = bucket.records.first().map(|pr| pr.author.avatar_url.clone());
      bucket.color = Some(string_to_color(login).to_string());
      bucket.children = children;
      bucket
    })
    .collect();

  let children = nested(
    &others,
    &label_keys,
    catalog,
    OTHER_AUTHORS_KEY,
    OTHER_AUTHORS_OTHER_KEY.to_string(),
  );
  let mut other = GroupBucket::new(OTHER_AUTHORS_KEY.to_string(), "Other Authors", others);
  other.children = children;
  buckets.push(other);

  non_empty(buckets)
}

fn nested(
  records: &[PullRequest],
  label_keys: &[&str],
  catalog: &[Label],
  parent_key: &str,
  other_key: String,
) -> Vec<GroupBucket> {
  if label_keys.is_empty() || records.is_empty() {
    return Vec::new();
  }
  label_buckets(
    records,
    label_keys,
    catalog,
    &format!("{}/", parent_key),
    other_key,
  )
}

fn label_buckets(
  records: &[PullRequest],
  label_keys: &[&str],
  catalog: &[Label],
  key_prefix: &str,
  other_key: String,
) -> Vec<GroupBucket> {
  let matchers: Vec<LabelMatcher> = label_keys
    .iter()
    .map(|key| LabelMatcher::new(key, catalog))
    .collect();

  let mut grouped: Vec<Vec<PullRequest>> = vec![Vec::new(); matchers.len()];
  let mut ungrouped = Vec::new();
  for pr in records {
    match matchers.iter().position(|m| m.matches(pr)) {
      Some(idx) => grouped[idx].push(pr.clone()),
      None => ungrouped.push(pr.clone()),
    }
  }

  let mut buckets: Vec<GroupBucket> = label_keys
    .iter()
    .zip(grouped)
    .map(|(name, records)| {
      let mut bucket = GroupBucket::new(format!("{}label-{}", key_prefix, name), *name, records);
      let color = catalog
        .iter()
        .find(|l| l.name == *name)
        .map(|l| l.color.as_str())
        .unwrap_or(DEFAULT_LABEL_COLOR);
      bucket.color = Some(color.to_string());
      bucket
    })
    .collect();
  buckets.push(GroupBucket::new(other_key, "Other", ungrouped));

  non_empty(buckets)
}

fn non_empty(buckets: Vec<GroupBucket>) -> Vec<GroupBucket> {
  buckets.into_iter().filter(|b| !b.is_empty()).collect()
}
