//! Reading and writing the on-disk word list.
//!
//! The format is a small XML document whose first `<Recognized>` element
//! holds one `<Word>` per accepted word:
//!
//! ```xml
//! <Dictionary>
//!   <Words>
//!     <Recognized>
//!       <Word>example</Word>
//!     </Recognized>
//!   </Words>
//! </Dictionary>
//! ```
//!
//! Parsing is all-or-nothing. A document that is not well formed, or that
//! has no `<Recognized>` section, yields an error and never a partial set.

use std::collections::BTreeSet;
use std::ops::Range;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ParseError;

pub const TEMPLATE: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<Dictionary>\n\
\t<Words>\n\
\t\t<Recognized>\n\
\t\t</Recognized>\n\
\t</Words>\n\
</Dictionary>\n";

const RECOGNIZED: &[u8] = b"Recognized";
const WORD: &[u8] = b"Word";

/// A parsed dictionary together with the place a new word would go.
#[derive(Debug, Clone)]
pub struct Document {
    pub words: BTreeSet<String>,
    anchor: Anchor,
}

#[derive(Debug, Clone)]
enum Anchor {
    /// Byte offset of the `</Recognized>` closing tag.
    Closing(usize),
    /// Byte range of a self-closing `<Recognized/>`.
    SelfClosing(Range<usize>),
}

/// A single text replacement against the document it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub text: String,
}

impl Edit {
    pub fn apply(&self, document: &str) -> String {
        let mut out = String::with_capacity(document.len() + self.text.len());
        out.push_str(&document[..self.range.start]);
        out.push_str(&self.text);
        out.push_str(&document[self.range.end..]);
        out
    }
}

pub fn parse(text: &str) -> Result<BTreeSet<String>, ParseError> {
    parse_document(text).map(|document| document.words)
}

pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(text);

    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut roots = 0usize;
    let mut words = BTreeSet::new();
    let mut anchor = None;
    // Depth of the first <Recognized> while we are inside it.
    let mut recognized_at: Option<usize> = None;
    // Depth of the <Word> being collected and its text so far.
    let mut word: Option<(usize, String)> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Malformed {
            position: reader.buffer_position() as usize,
            message: e.to_string(),
        })?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(e) => {
                if open.is_empty() {
                    roots += 1;
                    if roots > 1 {
                        return Err(malformed(end, "more than one root element"));
                    }
                }
                let name = e.name().as_ref().to_vec();
                if name == RECOGNIZED && recognized_at.is_none() && anchor.is_none() {
                    recognized_at = Some(open.len());
                } else if name == WORD && recognized_at.is_some() && word.is_none() {
                    word = Some((open.len(), String::new()));
                }
                open.push(name);
            }
            Event::Empty(e) => {
                if open.is_empty() {
                    roots += 1;
                    if roots > 1 {
                        return Err(malformed(end, "more than one root element"));
                    }
                }
                if e.name().as_ref() == RECOGNIZED && recognized_at.is_none() && anchor.is_none() {
                    let start = text[..end].rfind('<').unwrap_or(0);
                    anchor = Some(Anchor::SelfClosing(start..end));
                }
            }
            Event::End(e) => {
                let Some(name) = open.pop() else {
                    return Err(malformed(end, "closing tag without opening tag"));
                };
                if name.as_slice() != e.name().as_ref() {
                    return Err(ParseError::Unbalanced(
                        String::from_utf8_lossy(&name).into_owned(),
                    ));
                }
                if let Some((depth, value)) = word.take() {
                    if depth == open.len() {
                        if !value.is_empty() {
                            words.insert(value);
                        }
                    } else {
                        word = Some((depth, value));
                    }
                }
                if recognized_at == Some(open.len()) {
                    recognized_at = None;
                    let start = text[..end].rfind("</").unwrap_or(end);
                    anchor = Some(Anchor::Closing(start));
                }
            }
            Event::Text(t) => {
                if open.is_empty() {
                    if !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(malformed(end, "text outside of the root element"));
                    }
                } else if let Some((_, value)) = word.as_mut() {
                    let unescaped = t.unescape().map_err(|e| malformed(end, &e.to_string()))?;
                    value.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if let Some((_, value)) = word.as_mut() {
                    let raw = std::str::from_utf8(&c).map_err(|e| malformed(end, &e.to_string()))?;
                    value.push_str(raw);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(name) = open.pop() {
        return Err(ParseError::Unbalanced(String::from_utf8_lossy(&name).into_owned()));
    }
    if roots == 0 {
        return Err(ParseError::NoRoot);
    }
    let anchor = anchor.ok_or(ParseError::MissingRecognized)?;
    Ok(Document { words, anchor })
}

fn malformed(position: usize, message: &str) -> ParseError {
    ParseError::Malformed {
        position,
        message: message.to_string(),
    }
}

impl Document {
    /// The edit that adds `word` to `text`, or `None` if an exact
    /// (case-sensitive) match is already present.
    pub fn insertion(&self, text: &str, word: &str) -> Option<Edit> {
        if self.words.contains(word) {
            return None;
        }
        let entry = format!("<Word>{}</Word>", escape(word));

        let edit = match &self.anchor {
            Anchor::SelfClosing(range) => {
                let tag = text[range.clone()].trim_end_matches('>');
                let tag = tag.trim_end().trim_end_matches('/').trim_end();
                Edit {
                    range: range.clone(),
                    text: format!("{tag}>{entry}</Recognized>"),
                }
            }
            Anchor::Closing(closing) => {
                let line_start = text[..*closing].rfind('\n').map_or(0, |i| i + 1);
                let before = &text[line_start..*closing];
                if before.chars().all(char::is_whitespace) {
                    Edit {
                        range: line_start..line_start,
                        text: format!("{before}\t{entry}{}", line_ending(text)),
                    }
                } else {
                    let at = line_start + before.trim_end().len();
                    Edit {
                        range: at..at,
                        text: entry,
                    }
                }
            }
        };
        Some(edit)
    }
}

/// Computes the edit that adds `word` to the dictionary in `text`.
pub fn insertion(text: &str, word: &str) -> Result<Option<Edit>, ParseError> {
    Ok(parse_document(text)?.insertion(text, word))
}

/// Adds `word` to `document`, starting from [`TEMPLATE`] when there is no
/// document yet. Returns `None` when the word is already present.
pub fn insert_word(document: Option<&str>, word: &str) -> Result<Option<String>, ParseError> {
    let text = document.unwrap_or(TEMPLATE);
    let edit = insertion(text, word)?;
    match (edit, document) {
        (Some(edit), _) => Ok(Some(edit.apply(text))),
        (None, None) => Ok(Some(TEMPLATE.to_string())),
        (None, Some(_)) => Ok(None),
    }
}

fn line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}
