//! Tag extraction from model replies.
//!
//! Replies carry their structure as pseudo-XML sections such as
//! `<Response_to_User>…</Response_to_User>`. Extraction never fails: a missing
//! start tag, a missing end tag, or an end tag that only appears before the
//! start tag all yield empty content.

use serde::{Deserialize, Serialize};
use siloed_core::task::{DelegateReply, StructuredResult};

/// The tag vocabulary of the primary model's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    ResponseToUser,
    QuestionsForUser,
    Tasks,
    WizardTask,
    InternalMonologue,
}

impl Tag {
    pub const ALL: [Tag; 5] = [
        Tag::ResponseToUser,
        Tag::QuestionsForUser,
        Tag::Tasks,
        Tag::WizardTask,
        Tag::InternalMonologue,
    ];

    /// The exact name used inside the angle brackets.
    pub fn wire_name(self) -> &'static str {
        match self {
            Tag::ResponseToUser => "Response_to_User",
            Tag::QuestionsForUser => "questions_for_user",
            Tag::Tasks => "tasks",
            Tag::WizardTask => "wizard_task",
            Tag::InternalMonologue => "internal_monologue",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Everything extracted from one primary reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReply {
    pub response_to_user: String,
    pub questions_for_user: Vec<String>,
    pub tasks: Vec<String>,
    /// One entry per `<wizard_task>` section, in order.
    pub wizard_tasks: Vec<String>,
    pub internal_monologue: String,
}

impl ParsedReply {
    /// Content of `tag` as text; list-valued tags are joined by newlines.
    pub fn get(&self, tag: Tag) -> String {
        match tag {
            Tag::ResponseToUser => self.response_to_user.clone(),
            Tag::QuestionsForUser => self.questions_for_user.join("\n"),
            Tag::Tasks => self.tasks.join("\n"),
            Tag::WizardTask => self.wizard_tasks.join("\n"),
            Tag::InternalMonologue => self.internal_monologue.clone(),
        }
    }

    pub fn has_questions(&self) -> bool {
        !self.questions_for_user.is_empty()
    }

    /// The user-facing part of the reply.
    pub fn to_result(&self) -> StructuredResult {
        StructuredResult {
            response_to_user: self.response_to_user.clone(),
            questions_for_user: self.questions_for_user.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

/// Parse a primary model reply.
pub fn parse(raw: &str) -> ParsedReply {
    ParsedReply {
        response_to_user: extract_tag(raw, Tag::ResponseToUser.wire_name()),
        questions_for_user: split_lines(&extract_tag(raw, Tag::QuestionsForUser.wire_name())),
        tasks: split_lines(&extract_tag(raw, Tag::Tasks.wire_name())),
        wizard_tasks: extract_all(raw, Tag::WizardTask.wire_name()),
        internal_monologue: extract_tag(raw, Tag::InternalMonologue.wire_name()),
    }
}

/// Parse a delegate model reply.
pub fn parse_delegate(raw: &str) -> DelegateReply {
    DelegateReply {
        wizard_response: extract_tag(raw, "wizard_response"),
        code: extract_tag(raw, "code"),
        explanation: extract_tag(raw, "explanation"),
    }
}

/// Trimmed content between the first `<tag>` and the first `</tag>` after it.
pub fn extract_tag(content: &str, tag: &str) -> String {
    find_section(content, tag, 0)
        .map(|(inner, _)| inner.trim().to_string())
        .unwrap_or_default()
}

/// Every non-overlapping `<tag>…</tag>` section in order, trimmed, empty ones skipped.
pub fn extract_all(content: &str, tag: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut from = 0;
    while let Some((inner, next)) = find_section(content, tag, from) {
        let inner = inner.trim();
        if !inner.is_empty() {
            sections.push(inner.to_string());
        }
        from = next;
    }
    sections
}

/// Split on newlines, trim each line, drop blank ones.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Locate a section starting at byte offset `from`.
///
/// Returns the raw inner text and the offset just past the end tag.
fn find_section<'a>(content: &'a str, tag: &str, from: usize) -> Option<(&'a str, usize)> {
    let start_tag = format!("<{tag}>");
    let end_tag = format!("</{tag}>");

    let start = from + content.get(from..)?.find(&start_tag)? + start_tag.len();
    let end = start + content[start..].find(&end_tag)?;
    Some((&content[start..end], end + end_tag.len()))
}
