//! Ascent-list parser: grade sections of position-indexed sibling rows.
//!
//! The source format has no row markup beyond shape: a sibling of a grade
//! header is an ascent row if and only if it has exactly 19 node children.
//! Any other non-whitespace sibling ends the section, so one malformed row
//! silently truncates the rows behind it. That fragility is part of the
//! format's observable behavior and is reproduced here unchanged.

use chrono::NaiveDate;
use crag_core::{AscentRecord, AscentStyle, UserId, RECOMMENDED_ICON};
use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};

use crate::{node_text, ParseError};

const SECTION_HEADER_SELECTOR: &str = ".AscentListHeadRow";
const ROW_CHILD_COUNT: usize = 19;
const STAR_GLYPH: char = '*';

/// Semantic role of each expected child slot of an ascent row, by node
/// position. Even positions hold insignificant whitespace.
mod slot {
    pub const DATE: usize = 1;
    pub const STYLE: usize = 3;
    pub const NAME: usize = 5;
    pub const RECOMMENDED: usize = 7;
    pub const AREA: usize = 9;
    pub const TAGS: usize = 11;
    pub const COMMENT: usize = 13;
    pub const STARS: usize = 15;
}

/// Classification of a header's following sibling.
enum SiblingShape<'a> {
    /// Exactly 19 node children: an ascent row.
    Row(ElementRef<'a>),
    /// Whitespace-only text, skipped without ending the section.
    Whitespace,
    /// Anything else terminates the section's row walk.
    SectionEnd,
}

fn classify_sibling(node: NodeRef<'_, Node>) -> SiblingShape<'_> {
    if let Node::Text(text) = node.value() {
        if text.text.trim().is_empty() {
            return SiblingShape::Whitespace;
        }
        return SiblingShape::SectionEnd;
    }
    match ElementRef::wrap(node) {
        Some(element) if element.children().count() == ROW_CHILD_COUNT => {
            SiblingShape::Row(element)
        }
        _ => SiblingShape::SectionEnd,
    }
}

/// Grade label of one section header: the second node child of the header's
/// first `<b>` descendant.
fn section_grade(header: ElementRef<'_>) -> Result<String, ParseError> {
    let bold_selector = Selector::parse("b").expect("valid selector");
    let bold = header
        .select(&bold_selector)
        .next()
        .ok_or(ParseError::MissingElement("grade header label"))?;
    let node = bold.children().nth(1).ok_or(ParseError::MissingChild {
        element: "grade header label",
        index: 1,
    })?;
    Ok(node_text(node))
}

fn cell(row: ElementRef<'_>, index: usize) -> Result<ElementRef<'_>, ParseError> {
    row.children()
        .nth(index)
        .and_then(ElementRef::wrap)
        .ok_or(ParseError::MissingChild {
            element: "ascent row",
            index,
        })
}

fn cell_text(row: ElementRef<'_>, index: usize) -> Result<String, ParseError> {
    Ok(cell(row, index)?.text().collect())
}

fn icon_src(row: ElementRef<'_>, index: usize, role: &'static str) -> Result<String, ParseError> {
    let img_selector = Selector::parse("img").expect("valid selector");
    cell(row, index)?
        .select(&img_selector)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string)
        .ok_or(ParseError::MissingElement(role))
}

/// The date lives in the second child of its cell, either wrapped in a
/// nested element or as plain text.
fn date_slot(row: ElementRef<'_>) -> Result<NaiveDate, ParseError> {
    let date_cell = cell(row, slot::DATE)?;
    let node = date_cell
        .children()
        .nth(1)
        .ok_or(ParseError::MissingChild {
            element: "date cell",
            index: 1,
        })?;
    let text = node_text(node);
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, "%y-%m-%d").map_err(|_| ParseError::BadDate {
        context: "ascent date",
        value: trimmed.to_string(),
    })
}

fn name_slot(row: ElementRef<'_>) -> Result<String, ParseError> {
    let link_selector = Selector::parse("a").expect("valid selector");
    cell(row, slot::NAME)?
        .select(&link_selector)
        .next()
        .map(|link| link.text().collect())
        .ok_or(ParseError::MissingElement("climb name link"))
}

/// A comment cell with a single child carries only its label; an actual
/// comment is the last of the cell's own children.
fn comment_slot(row: ElementRef<'_>) -> Result<String, ParseError> {
    let comment_cell = cell(row, slot::COMMENT)?;
    let children: Vec<_> = comment_cell.children().collect();
    match children.last() {
        Some(last) if children.len() > 1 => Ok(node_text(*last)),
        _ => Ok(String::new()),
    }
}

fn parse_row(
    user_id: UserId,
    grade: &str,
    row: ElementRef<'_>,
) -> Result<AscentRecord, ParseError> {
    let date = date_slot(row)?;
    let style = AscentStyle::from_icon_src(&icon_src(row, slot::STYLE, "style icon")?);
    let name = name_slot(row)?;
    let recommended = icon_src(row, slot::RECOMMENDED, "recommendation icon")? == RECOMMENDED_ICON;
    let area = cell_text(row, slot::AREA)?;
    let tags = cell_text(row, slot::TAGS)?.trim().to_string();
    let comment = comment_slot(row)?;
    let stars = cell_text(row, slot::STARS)?
        .trim()
        .chars()
        .filter(|&c| c == STAR_GLYPH)
        .count() as u32;

    Ok(AscentRecord {
        user_id,
        name,
        grade: grade.to_string(),
        date,
        style,
        recommended,
        area,
        tags,
        comment,
        stars,
    })
}

/// Lazy, finite, non-restartable walk over every ascent row of the page,
/// in document order, each record tagged with its enclosing section's
/// grade label. Structural corruption inside a row surfaces as an `Err`
/// item; a malformed row shape ends its section silently instead.
pub fn ascent_records(document: &Html, user_id: UserId) -> AscentRecords<'_> {
    let header_selector =
        Selector::parse(SECTION_HEADER_SELECTOR).expect("valid class selector");
    let headers: Vec<ElementRef<'_>> = document.select(&header_selector).collect();
    AscentRecords {
        user_id,
        headers: headers.into_iter(),
        section: None,
    }
}

pub struct AscentRecords<'a> {
    user_id: UserId,
    headers: std::vec::IntoIter<ElementRef<'a>>,
    section: Option<Section<'a>>,
}

struct Section<'a> {
    grade: String,
    cursor: Option<NodeRef<'a, Node>>,
}

impl<'a> Iterator for AscentRecords<'a> {
    type Item = Result<AscentRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(section) = &mut self.section {
                while let Some(node) = section.cursor {
                    section.cursor = node.next_sibling();
                    match classify_sibling(node) {
                        SiblingShape::Whitespace => continue,
                        SiblingShape::Row(row) => {
                            return Some(parse_row(self.user_id, &section.grade, row));
                        }
                        SiblingShape::SectionEnd => {
                            section.cursor = None;
                        }
                    }
                }
                self.section = None;
            }

            let header = self.headers.next()?;
            match section_grade(header) {
                Ok(grade) => {
                    self.section = Some(Section {
                        grade,
                        cursor: header.next_sibling(),
                    });
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
