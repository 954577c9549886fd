//! Forward, line-oriented scanner over a Markdown body.
//!
//! The scanner yields [`Token`]s lazily. It only keeps the state needed to
//! tell markers apart from literal text: whether a code fence is open (and
//! which fence closes it) and whether a tab group is open.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(`{3,}|~{3,})\s*([^`]*)$").expect("valid regex literal")
});
static TAB_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#tab/([^)\s]+)").expect("valid regex literal")
});
static INLINE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\](?:\([^)]*\)|\[[^\]]*\])").expect("valid regex literal")
});
static IMAGE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*:::image\b.*\bsource\s*=\s*""#).expect("valid regex literal")
});
static CODE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*:::code(?:\s|$)").expect("valid regex literal")
});
static PORTAL_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://ai\.azure\.com\b(/?\?cid=learnDocs\b)?").expect("valid regex literal")
});
static STEP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,9})[.)]\s+\S").expect("valid regex literal")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `language` is the lowercased first word of the info string, if any.
    CodeFenceOpen { language: Option<String> },
    CodeFenceClose,
    ImageRef,
    TabMarker { id: String },
    TabGroupClose,
    StepMarker { number: u32 },
    CodeRef,
    /// A link to the AI portal; `tracked` when it carries `?cid=learnDocs`.
    PortalLink { tracked: bool },
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    fn is_closed_by(self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.len() >= self.len && trimmed.chars().all(|c| c == self.marker)
    }
}

pub struct Scanner<'a> {
    lines: std::str::Lines<'a>,
    pending: VecDeque<Token>,
    fence: Option<Fence>,
    tab_group_open: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(body: &'a str) -> Self {
        Self {
            lines: body.lines(),
            pending: VecDeque::new(),
            fence: None,
            tab_group_open: false,
        }
    }

    fn scan_line(&mut self, line: &str) {
        if let Some(fence) = self.fence {
            if fence.is_closed_by(line) {
                self.fence = None;
                self.pending.push_back(Token::CodeFenceClose);
            }
            return;
        }

        if let Some(caps) = FENCE_OPEN.captures(line) {
            let marker = &caps[1];
            self.fence = marker.chars().next().map(|c| Fence {
                marker: c,
                len: marker.len(),
            });
            let language = caps[2]
                .split_whitespace()
                .next()
                .map(str::to_lowercase)
                .filter(|lang| !lang.is_empty());
            self.pending.push_back(Token::CodeFenceOpen { language });
            return;
        }

        if self.tab_group_open && line.trim() == "---" {
            self.tab_group_open = false;
            self.pending.push_back(Token::TabGroupClose);
            return;
        }

        if CODE_DIRECTIVE.is_match(line) {
            self.pending.push_back(Token::CodeRef);
        }
        if IMAGE_DIRECTIVE.is_match(line) {
            self.pending.push_back(Token::ImageRef);
        }
        for _ in INLINE_IMAGE.find_iter(line) {
            self.pending.push_back(Token::ImageRef);
        }
        for caps in TAB_MARKER.captures_iter(line) {
            self.tab_group_open = true;
            self.pending.push_back(Token::TabMarker {
                id: caps[1].to_owned(),
            });
        }
        for caps in PORTAL_LINK.captures_iter(line) {
            self.pending.push_back(Token::PortalLink {
                tracked: caps.get(1).is_some(),
            });
        }
        if let Some(caps) = STEP.captures(line)
            && let Ok(number) = caps[1].parse()
        {
            self.pending.push_back(Token::StepMarker { number });
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            let line = self.lines.next()?;
            self.scan_line(line);
        }
    }
}
