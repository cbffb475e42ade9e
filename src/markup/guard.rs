//! Incomplete-markup guard.
//!
//! Detects live tags that are still being typed so a render can skip the
//! document instead of matching a half-written tag. Each tag occurrence is
//! driven through a small state machine:
//!
//! ```text
//! TagName ──ws──▶ Attributes ──'>'──▶ Body ──close tag──▶ Closed
//!                     │                  │
//!                   EOF                 EOF
//!                     ▼                  ▼
//!           UnterminatedOpenTag    MissingCloseTag
//! ```
//!
//! `exec` has one extra state after `Closed`: it must be followed by an
//! `<output>…</output>` pair.

use std::fmt;

/// A tag family the guard watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub name: &'static str,
    /// Required first attribute, e.g. `data-codebook=`
    pub marker: Option<&'static str>,
    pub close: &'static str,
    /// Tag must be followed by an `<output>` block
    pub needs_output: bool,
}

pub const GUARDED_TAGS: &[TagSpec] = &[
    TagSpec {
        name: "cicada",
        marker: None,
        close: "</cicada>",
        needs_output: false,
    },
    TagSpec {
        name: "exec",
        marker: None,
        close: "</exec>",
        needs_output: true,
    },
    TagSpec {
        name: "div",
        marker: Some("data-codebook="),
        close: "</div>",
        needs_output: false,
    },
    TagSpec {
        name: "span",
        marker: Some("data-codebook="),
        close: "</span>",
        needs_output: false,
    },
];

/// Where a tag stopped short of being complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partial {
    /// No `>` after the opening tag
    UnterminatedOpenTag,
    /// Odd number of `"` inside the opening tag
    UnclosedQuote,
    /// No closing tag after the opening tag
    MissingCloseTag,
    /// `</exec>` not followed by `<output>…</output>`
    MissingOutput,
}

/// First incomplete tag found in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete {
    pub tag: &'static str,
    pub offset: usize,
    pub partial: Partial,
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.partial {
            Partial::UnterminatedOpenTag => "unterminated opening tag",
            Partial::UnclosedQuote => "unclosed attribute quote",
            Partial::MissingCloseTag => "missing closing tag",
            Partial::MissingOutput => "missing <output> block",
        };
        write!(f, "<{}> {what}", self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TagName,
    Attributes { start: usize },
    Body { from: usize },
    Closed { at: usize },
    AwaitOutput { from: usize },
    Done,
}

/// Run one tag occurrence at `open` (pointing at `<`) through the machine.
///
/// Returns `None` if the occurrence is not an opening tag of this family,
/// `Some(Ok(()))` if it is complete, `Some(Err(partial))` otherwise.
fn check_occurrence(text: &str, open: usize, spec: &TagSpec) -> Option<Result<(), Partial>> {
    let mut state = State::TagName;
    loop {
        state = match state {
            State::TagName => {
                let after_name = open + 1 + spec.name.len();
                let rest = &text[after_name..];
                let trimmed = rest.trim_start();
                // `<exec>` or `<execute` are not this family
                if trimmed.len() == rest.len() {
                    return None;
                }
                if let Some(marker) = spec.marker
                    && !trimmed.starts_with(marker)
                {
                    return None;
                }
                State::Attributes { start: after_name }
            }
            State::Attributes { start } => {
                let Some(gt) = text[start..].find('>') else {
                    return Some(Err(Partial::UnterminatedOpenTag));
                };
                let end = start + gt;
                if text[start..end].matches('"').count() % 2 == 1 {
                    return Some(Err(Partial::UnclosedQuote));
                }
                State::Body { from: end + 1 }
            }
            State::Body { from } => match text[from..].find(spec.close) {
                Some(i) => State::Closed {
                    at: from + i + spec.close.len(),
                },
                None => return Some(Err(Partial::MissingCloseTag)),
            },
            State::Closed { at } if spec.needs_output => State::AwaitOutput { from: at },
            State::Closed { .. } => State::Done,
            State::AwaitOutput { from } => {
                let rest = text[from..].trim_start();
                match rest.strip_prefix("<output>") {
                    Some(body) if body.contains("</output>") => State::Done,
                    _ => return Some(Err(Partial::MissingOutput)),
                }
            }
            State::Done => return Some(Ok(())),
        };
    }
}

/// First incomplete live tag in `text`, if any.
pub fn find_incomplete(text: &str) -> Option<Incomplete> {
    GUARDED_TAGS.iter().find_map(|spec| {
        let needle = format!("<{}", spec.name);
        text.match_indices(&needle).find_map(|(open, _)| {
            match check_occurrence(text, open, spec)? {
                Ok(()) => None,
                Err(partial) => Some(Incomplete {
                    tag: spec.name,
                    offset: open,
                    partial,
                }),
            }
        })
    })
}
