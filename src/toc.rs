use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context as _;
use url::Url;

use crate::cli::FlattenArgs;
use crate::formats::{FlatEntry, TOC_COLUMNS, TocNode, TocStatus, parse_toc_items};
use crate::table::Table;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenStats {
    pub entries: usize,
    pub headers: usize,
    pub cycles: usize,
    pub missing: usize,
    pub invalid: usize,
}

impl FlattenStats {
    pub fn from_entries(entries: &[FlatEntry]) -> Self {
        let mut stats = Self {
            entries: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            if entry.href.is_none() {
                stats.headers += 1;
            }
            match entry.status {
                TocStatus::Ok => {}
                TocStatus::Cycle => stats.cycles += 1,
                TocStatus::Missing => stats.missing += 1,
                TocStatus::Invalid => stats.invalid += 1,
            }
        }
        stats
    }

    pub fn unresolved(&self) -> usize {
        self.cycles + self.missing + self.invalid
    }
}

pub fn run(args: FlattenArgs) -> anyhow::Result<FlattenStats> {
    let toc_path = PathBuf::from(&args.toc);
    let out_path = PathBuf::from(&args.out);
    let base_url = parse_base_url(&args.url_path)?;

    let content_root = args.base_dir.as_deref().map(Path::new);
    let entries = flatten_file(&toc_path, &base_url, content_root)?;
    let stats = FlattenStats::from_entries(&entries);

    entries_to_table(&entries, args.skip_headers)
        .write_csv(&out_path, args.force)
        .context("write flattened toc")?;

    tracing::info!(
        toc = %toc_path.display(),
        out = %out_path.display(),
        entries = stats.entries,
        unresolved = stats.unresolved(),
        "flatten complete"
    );
    Ok(stats)
}

/// Parses the URL prefix articles live under. It is always treated as a directory.
pub fn parse_base_url(url_path: &str) -> anyhow::Result<Url> {
    let url_path = url_path.trim();
    let with_slash = if url_path.ends_with('/') {
        url_path.to_owned()
    } else {
        format!("{url_path}/")
    };
    Url::parse(&with_slash).with_context(|| format!("parse base url: {url_path}"))
}

pub fn load_toc(path: &Path) -> anyhow::Result<Vec<TocNode>> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("read toc: {}", path.display()))?;
    let items =
        parse_toc_items(&yaml).with_context(|| format!("parse toc: {}", path.display()))?;
    Ok(items.into_iter().map(TocNode::from).collect())
}

pub fn entries_to_table(entries: &[FlatEntry], skip_headers: bool) -> Table {
    let columns = TOC_COLUMNS.iter().map(|c| (*c).to_owned()).collect();
    let rows = entries
        .iter()
        .filter(|e| !skip_headers || e.href.is_some())
        .map(FlatEntry::to_cells)
        .collect();
    Table::new(columns, rows)
}

/// Flattens the TOC at `root`. Only a root TOC that cannot be loaded is an error;
/// nested references that fail are reported through [`FlatEntry::status`].
///
/// `/`-rooted nested references resolve under `content_root`, or under the root
/// TOC's directory when none is given.
pub fn flatten_file(
    root: &Path,
    base_url: &Url,
    content_root: Option<&Path>,
) -> anyhow::Result<Vec<FlatEntry>> {
    let nodes = load_toc(root).context("load root toc")?;
    Ok(flatten_tree_in(nodes, root, base_url, content_root))
}

/// Flattens an already-loaded tree whose relative references resolve against `toc_path`.
pub fn flatten_tree(nodes: Vec<TocNode>, toc_path: &Path, base_url: &Url) -> Vec<FlatEntry> {
    flatten_tree_in(nodes, toc_path, base_url, None)
}

fn flatten_tree_in(
    nodes: Vec<TocNode>,
    toc_path: &Path,
    base_url: &Url,
    content_root: Option<&Path>,
) -> Vec<FlatEntry> {
    let identity = std::fs::canonicalize(toc_path).unwrap_or_else(|_| toc_path.to_path_buf());
    let dir = parent_dir(toc_path);
    let ctx = Rc::new(TocContext {
        path: toc_path.to_path_buf(),
        content_root: Rc::new(content_root.map_or_else(|| dir.clone(), Path::to_path_buf)),
        dir,
        url_base: base_url.clone(),
        ancestry: vec![identity],
    });

    let root_crumb = Rc::new(Vec::new());
    let mut stack = nodes
        .into_iter()
        .rev()
        .map(|node| WorkItem {
            node,
            depth: 0,
            breadcrumb: Rc::clone(&root_crumb),
            ctx: Rc::clone(&ctx),
        })
        .collect::<Vec<_>>();

    let mut entries = Vec::new();
    while let Some(WorkItem {
        node,
        depth,
        breadcrumb,
        ctx,
    }) = stack.pop()
    {
        let (status, nested) = match node.nested_toc.as_deref() {
            Some(reference) => expand_reference(&ctx, reference),
            None => (TocStatus::Ok, None),
        };
        entries.push(flat_entry(&node, depth, &breadcrumb, &ctx, status));

        let mut child_crumb = breadcrumb.as_ref().clone();
        child_crumb.push(node.title);
        let child_crumb = Rc::new(child_crumb);

        let mut children = Vec::new();
        if let Some((nested_nodes, nested_ctx)) = nested {
            children.extend(nested_nodes.into_iter().map(|n| (n, Rc::clone(&nested_ctx))));
        }
        children.extend(node.children.into_iter().map(|n| (n, Rc::clone(&ctx))));

        for (child, child_ctx) in children.into_iter().rev() {
            stack.push(WorkItem {
                node: child,
                depth: depth + 1,
                breadcrumb: Rc::clone(&child_crumb),
                ctx: child_ctx,
            });
        }
    }

    entries
}

#[derive(Debug)]
struct TocContext {
    path: PathBuf,
    dir: PathBuf,
    content_root: Rc<PathBuf>,
    url_base: Url,
    /// Canonical TOC files on the active expansion path, root first.
    ancestry: Vec<PathBuf>,
}

struct WorkItem {
    node: TocNode,
    depth: usize,
    breadcrumb: Rc<Vec<String>>,
    ctx: Rc<TocContext>,
}

type Expansion = (TocStatus, Option<(Vec<TocNode>, Rc<TocContext>)>);

fn expand_reference(ctx: &TocContext, reference: &str) -> Expansion {
    let relative = strip_query(reference);
    let target = match relative.strip_prefix('/') {
        Some(rooted) => ctx.content_root.join(rooted.trim_start_matches('/')),
        None => ctx.dir.join(relative),
    };

    let Ok(identity) = std::fs::canonicalize(&target) else {
        tracing::warn!(
            toc = %ctx.path.display(),
            reference,
            "nested toc not found; not expanded"
        );
        return (TocStatus::Missing, None);
    };

    if ctx.ancestry.contains(&identity) {
        tracing::warn!(
            toc = %ctx.path.display(),
            reference,
            "nested toc reference forms a cycle; not expanded"
        );
        return (TocStatus::Cycle, None);
    }

    let nodes = match load_toc(&target) {
        Ok(nodes) => nodes,
        Err(err) => {
            tracing::warn!(
                toc = %ctx.path.display(),
                reference,
                err = %format!("{err:#}"),
                "nested toc could not be parsed; not expanded"
            );
            return (TocStatus::Invalid, None);
        }
    };

    let url_base = ctx
        .url_base
        .join(reference)
        .and_then(|u| u.join("./"))
        .unwrap_or_else(|_| ctx.url_base.clone());
    let mut ancestry = ctx.ancestry.clone();
    ancestry.push(identity);

    let nested = TocContext {
        dir: parent_dir(&target),
        content_root: Rc::clone(&ctx.content_root),
        path: target,
        url_base,
        ancestry,
    };
    (TocStatus::Ok, Some((nodes, Rc::new(nested))))
}

fn flat_entry(
    node: &TocNode,
    depth: usize,
    breadcrumb: &[String],
    ctx: &TocContext,
    status: TocStatus,
) -> FlatEntry {
    let url = node
        .href
        .as_deref()
        .map(|href| resolve_url(&ctx.url_base, href))
        .unwrap_or_default();
    let other_toc = node
        .href
        .as_deref()
        .or(node.nested_toc.as_deref())
        .is_some_and(|h| h.starts_with("..") || h.starts_with('/'));

    FlatEntry {
        depth,
        title: node.title.clone(),
        href: node.href.clone(),
        url,
        breadcrumb: breadcrumb.to_vec(),
        other_toc,
        source_toc: ctx.path.clone(),
        status,
    }
}

/// Published URL of an article href: relative to `base`, extension dropped.
pub fn resolve_url(base: &Url, href: &str) -> String {
    let href = href.trim();
    let joined = if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href)
    } else {
        base.join(href)
    };
    let Ok(mut url) = joined else {
        return String::new();
    };

    let path = url.path().to_owned();
    for ext in [".md", ".yml", ".yaml"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            url.set_path(stripped);
            break;
        }
    }
    url.to_string()
}

fn strip_query(reference: &str) -> &str {
    reference.split(['?', '#']).next().unwrap_or(reference)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
