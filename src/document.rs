//! Locating and reading the local Markdown documents a TOC points at.
//!
//! Nothing here fails: every lookup yields an [`Extraction`], either the value or
//! the reason it is empty, so callers fill rows with the empty value instead of
//! branching on errors.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction<T> {
    Found(T),
    Empty(EmptyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmptyReason {
    NoHref,
    /// The href points outside the content tree (e.g. `https://`).
    ExternalHref,
    FileMissing,
    Unreadable,
    HeaderMissing,
    HeaderMalformed,
}

impl EmptyReason {
    /// Whether the document itself exists even though nothing was extracted.
    pub fn file_found(self) -> bool {
        matches!(
            self,
            Self::Unreadable | Self::HeaderMissing | Self::HeaderMalformed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoHref => "no href",
            Self::ExternalHref => "external href",
            Self::FileMissing => "file missing",
            Self::Unreadable => "unreadable",
            Self::HeaderMissing => "header missing",
            Self::HeaderMalformed => "header malformed",
        }
    }
}

impl<T> Extraction<T> {
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Extraction<U>) -> Extraction<U> {
        match self {
            Self::Found(value) => f(value),
            Self::Empty(reason) => Extraction::Empty(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Extraction<U> {
        self.and_then(|value| Extraction::Found(f(value)))
    }

    pub fn as_ref(&self) -> Extraction<&T> {
        match self {
            Self::Found(value) => Extraction::Found(value),
            Self::Empty(reason) => Extraction::Empty(*reason),
        }
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Empty(_) => None,
        }
    }

    pub fn reason(&self) -> Option<EmptyReason> {
        match self {
            Self::Found(_) => None,
            Self::Empty(reason) => Some(*reason),
        }
    }
}

impl<T: Default> Extraction<T> {
    pub fn unwrap_or_empty(self) -> T {
        match self {
            Self::Found(value) => value,
            Self::Empty(_) => T::default(),
        }
    }
}

/// Resolves TOC hrefs to files under a content root.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    base_dir: PathBuf,
}

impl DocumentLocator {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Candidates, first existing wins: next to the source TOC, under the base
    /// directory, then under the base directory's parent (sibling doc sets).
    /// `/`-rooted hrefs only resolve under the base directory.
    pub fn resolve(&self, href: &str, toc_dir: Option<&Path>) -> Extraction<PathBuf> {
        let href = href.trim();
        let href = href.split(['?', '#']).next().unwrap_or(href);
        if href.is_empty() {
            return Extraction::Empty(EmptyReason::NoHref);
        }
        if href.contains("://") || href.starts_with("mailto:") {
            return Extraction::Empty(EmptyReason::ExternalHref);
        }

        let mut candidates = Vec::new();
        if let Some(rooted) = href.strip_prefix('/') {
            candidates.push(self.base_dir.join(rooted.trim_start_matches('/')));
        } else {
            if let Some(dir) = toc_dir {
                candidates.push(dir.join(href));
            }
            candidates.push(self.base_dir.join(href));
            if href.contains('/')
                && let Some(parent) = self.base_dir.parent()
            {
                candidates.push(parent.join(href));
            }
        }

        candidates
            .into_iter()
            .map(with_markdown_extension)
            .find(|path| path.is_file())
            .map_or(Extraction::Empty(EmptyReason::FileMissing), Extraction::Found)
    }
}

fn with_markdown_extension(mut path: PathBuf) -> PathBuf {
    if path.extension().is_none() {
        path.set_extension("md");
    }
    path
}

/// Reads a document as UTF-8 text, dropping a leading byte-order mark.
pub fn read_document(path: &Path) -> Extraction<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match contents.strip_prefix('\u{feff}') {
            Some(stripped) => Extraction::Found(stripped.to_owned()),
            None => Extraction::Found(contents),
        },
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "document unreadable");
            Extraction::Empty(EmptyReason::Unreadable)
        }
    }
}

/// A document split into its leading `---` header block and the body after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections<'a> {
    pub header: Result<&'a str, EmptyReason>,
    pub body: &'a str,
}

pub fn split_header(contents: &str) -> Sections<'_> {
    let mut pieces = contents.split_inclusive('\n');
    let Some(first) = pieces.next() else {
        return Sections {
            header: Err(EmptyReason::HeaderMissing),
            body: contents,
        };
    };
    if first.trim_end() != "---" {
        return Sections {
            header: Err(EmptyReason::HeaderMissing),
            body: contents,
        };
    }

    let header_start = first.len();
    let mut offset = header_start;
    for piece in pieces {
        if piece.trim_end() == "---" {
            return Sections {
                header: Ok(&contents[header_start..offset]),
                body: &contents[offset + piece.len()..],
            };
        }
        offset += piece.len();
    }

    Sections {
        header: Err(EmptyReason::HeaderMalformed),
        body: contents,
    }
}
