//! Event-stream envelope removal for streamable HTTP response bodies.
//!
//! A body is either plain JSON or `text/event-stream` framing around JSON.
//! Lines are classified, payload lines are regrouped into documents, and the
//! documents are handed to the JSON layer untouched.

/// Classification of a single body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `data:` line with the marker (and one following space) removed
    Data(&'a str),
    /// `id:`, `event:`, `retry:` or a `:` comment; never payload
    Metadata,
    /// Blank line, ends a framed event
    Separator,
    /// Anything else: unframed payload
    Raw(&'a str),
}

const METADATA_FIELDS: [&str; 3] = ["id:", "event:", "retry:"];

/// Classify one line. The trailing `\r` of CRLF bodies must already be gone.
pub fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() {
        return Line::Separator;
    }
    if let Some(rest) = line.strip_prefix("data:") {
        return Line::Data(rest.strip_prefix(' ').unwrap_or(rest));
    }
    if line.starts_with(':') || METADATA_FIELDS.iter().any(|f| line.starts_with(f)) {
        return Line::Metadata;
    }
    Line::Raw(line)
}

/// Split a response body into payload documents.
///
/// A blank line closes a document only after a `data:` line has been seen,
/// so multi-line unframed JSON stays in one piece. Empty documents (such as
/// the priming `data:` event some servers send) are dropped.
pub fn unframe(body: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut framed = false;

    for raw in body.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        match classify(line) {
            Line::Data(payload) => {
                current.push(payload);
                framed = true;
            }
            Line::Raw(payload) => current.push(payload),
            Line::Metadata => {}
            Line::Separator => {
                if framed {
                    flush(&mut current, &mut docs);
                    framed = false;
                }
            }
        }
    }
    flush(&mut current, &mut docs);

    docs
}

fn flush(current: &mut Vec<&str>, docs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let doc = current.join("\n");
    current.clear();
    if !doc.trim().is_empty() {
        docs.push(doc);
    }
}
