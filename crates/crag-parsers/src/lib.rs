//! Structural parsers turning raw page captures into typed records.
//!
//! Both pages carry no machine-readable markup: the profile page is read
//! through labeled anchors, the ascent list through sibling position and
//! fixed child counts. The parsers are pure and synchronous; the ingest
//! driver decides what a failure means for the surrounding batch.

mod ascents;
mod profile;

pub use ascents::{ascent_records, AscentRecords};
pub use profile::parse_profile;

use ego_tree::NodeRef;
use scraper::{ElementRef, Node};
use thiserror::Error;

pub const CRATE_NAME: &str = "crag-parsers";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("required element `{0}` not found")]
    MissingElement(&'static str),
    #[error("{element} has no child at position {index}")]
    MissingChild {
        element: &'static str,
        index: usize,
    },
    #[error("malformed {context} `{value}`")]
    BadDate {
        context: &'static str,
        value: String,
    },
}

/// Text content of an arbitrary node: the joined descendant text for an
/// element, the raw text for a text node, empty for anything else.
pub(crate) fn node_text(node: NodeRef<'_, Node>) -> String {
    if let Some(element) = ElementRef::wrap(node) {
        return element.text().collect();
    }
    match node.value() {
        Node::Text(text) => text.text.to_string(),
        _ => String::new(),
    }
}
