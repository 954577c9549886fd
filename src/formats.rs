use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

/// Items of a TOC file as written on disk: a bare list, an `items:` mapping, or
/// nothing at all.
pub fn parse_toc_items(yaml: &str) -> anyhow::Result<Vec<TocItem>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_yaml::from_str(yaml).context("parse yaml")?;
    let items = match value {
        Value::Sequence(_) => value,
        Value::Mapping(mut map) => map.remove("items").unwrap_or(Value::Null),
        Value::Null => Value::Null,
        _ => anyhow::bail!("expected a list of items or an `items:` mapping"),
    };
    let items: Option<Vec<TocItem>> = serde_yaml::from_value(items).context("read toc items")?;
    Ok(items.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TocItem {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub href: Option<String>,
    #[serde(default, rename = "topicHref", deserialize_with = "scalar_string")]
    pub topic_href: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<TocItem>,
}

/// Accepts any YAML scalar (`name: 2024`, `href: 123`) as text.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Tagged(tagged) => text(tagged.value),
            Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
        }
    }
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(text))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub title: String,
    pub href: Option<String>,
    pub children: Vec<TocNode>,
    /// Path of another TOC file whose items become this node's children.
    pub nested_toc: Option<String>,
}

impl From<TocItem> for TocNode {
    fn from(item: TocItem) -> Self {
        let href = item.href.filter(|h| !h.trim().is_empty());
        let (href, nested_toc) = match href {
            Some(h) if is_toc_reference(&h) => (item.topic_href, Some(h)),
            other => (other, None),
        };
        Self {
            title: item.name.unwrap_or_default(),
            href: href.filter(|h| !h.trim().is_empty()),
            children: item.items.into_iter().map(TocNode::from).collect(),
            nested_toc,
        }
    }
}

fn is_toc_reference(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.ends_with(".yml") || path.ends_with(".yaml")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocStatus {
    Ok,
    /// The nested TOC is already on the active expansion path.
    Cycle,
    Missing,
    Invalid,
}

impl TocStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cycle => "cycle",
            Self::Missing => "missing",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry {
    pub depth: usize,
    pub title: String,
    pub href: Option<String>,
    pub url: String,
    pub breadcrumb: Vec<String>,
    pub other_toc: bool,
    pub source_toc: PathBuf,
    pub status: TocStatus,
}

pub const TOC_COLUMNS: [&str; 8] = [
    "depth",
    "title",
    "href",
    "url",
    "breadcrumb",
    "other_toc",
    "source_toc",
    "toc_status",
];

pub const BREADCRUMB_SEPARATOR: &str = " > ";

impl FlatEntry {
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.depth.to_string(),
            self.title.clone(),
            self.href.clone().unwrap_or_default(),
            self.url.clone(),
            self.breadcrumb.join(BREADCRUMB_SEPARATOR),
            self.other_toc.to_string(),
            self.source_toc.to_string_lossy().to_string(),
            self.status.as_str().to_owned(),
        ]
    }
}

/// Header-block metadata of one document. `Default` is the empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_found: bool,
    pub owner: String,
    pub topic: String,
    pub author: String,
    pub description: String,
    pub pivot_groups: BTreeSet<String>,
    pub pivots: Vec<String>,
    pub hub_only: bool,
    pub doc_title: String,
    pub service: String,
    pub date: String,
}

pub const METADATA_COLUMNS: [&str; 11] = [
    "file_found",
    "ms.author",
    "ms.topic",
    "author",
    "description",
    "pivot_groups",
    "pivots",
    "hub_only",
    "doc_title",
    "ms.service",
    "ms.date",
];

impl FileMetadata {
    pub fn found_without_header() -> Self {
        Self {
            file_found: true,
            ..Self::default()
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.file_found.to_string(),
            self.owner.clone(),
            self.topic.clone(),
            self.author.clone(),
            self.description.clone(),
            join_set(&self.pivot_groups),
            self.pivots.join(LIST_SEPARATOR),
            self.hub_only.to_string(),
            self.doc_title.clone(),
            self.service.clone(),
            self.date.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentProfile {
    pub has_tabs: bool,
    pub tab_count: usize,
    pub tab_group_count: usize,
    pub tab_ids: BTreeSet<String>,
    pub image_count: usize,
    pub code_block_count: usize,
    pub code_languages: BTreeSet<String>,
    pub code_ref_count: usize,
    pub portal_step_count: usize,
    pub has_portal_steps: bool,
    /// Links to the AI portal without the `cid=learnDocs` tracking parameter.
    pub portal_link_untracked: bool,
    pub portal_link_tracked: bool,
}

pub const CONTENT_COLUMNS: [&str; 12] = [
    "has_tabs",
    "tab_count",
    "tab_group_count",
    "tab_ids",
    "image_count",
    "code_block_count",
    "code_languages",
    "code_ref_count",
    "portal_step_count",
    "has_portal_steps",
    "contains_link_no_param",
    "contains_link_with_param",
];

impl ContentProfile {
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.has_tabs.to_string(),
            self.tab_count.to_string(),
            self.tab_group_count.to_string(),
            join_set(&self.tab_ids),
            self.image_count.to_string(),
            self.code_block_count.to_string(),
            join_set(&self.code_languages),
            self.code_ref_count.to_string(),
            self.portal_step_count.to_string(),
            self.has_portal_steps.to_string(),
            self.portal_link_untracked.to_string(),
            self.portal_link_tracked.to_string(),
        ]
    }
}

pub const LIST_SEPARATOR: &str = ", ";

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(LIST_SEPARATOR)
}

/// One line of the summarizer checkpoint (`*.jsonl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub key: String,
    pub summary: String,
    pub summarized_at: String,
}
