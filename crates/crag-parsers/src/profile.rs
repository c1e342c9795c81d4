//! Profile-page parser: labeled anchors to one `UserProfile`.

use chrono::NaiveDate;
use crag_core::{DisciplineRanking, UserId, UserProfile};
use scraper::{ElementRef, Html, Selector};

use crate::{node_text, ParseError};

const VISITS_ANCHOR: &str = "LabelUserUpdatesVisits";

fn find_element<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&format!("#{id}")).expect("element ids are valid selectors");
    document.select(&selector).next()
}

fn find_text(document: &Html, id: &str) -> Option<String> {
    find_element(document, id).map(|element| element.text().collect())
}

/// Anchors whose absence fails the whole parse.
fn required_text(document: &Html, id: &'static str) -> Result<String, ParseError> {
    find_text(document, id).ok_or(ParseError::MissingElement(id))
}

/// Ranking anchors are optional: an absent anchor is an empty string, the
/// page simply has no entry for that discipline.
fn optional_text(document: &Html, id: &str) -> String {
    find_text(document, id).unwrap_or_default()
}

/// One `label: number` segment of the visits block, read from a fixed node
/// position: the value is the substring after the last colon with spaces
/// removed.
fn visits_segment(visits: ElementRef<'_>, index: usize) -> Result<String, ParseError> {
    let node = visits
        .children()
        .nth(index)
        .ok_or(ParseError::MissingChild {
            element: VISITS_ANCHOR,
            index,
        })?;
    let text = node_text(node);
    Ok(text.rsplit(':').next().unwrap_or("").replace(' ', ""))
}

fn ranking(document: &Html, discipline: char) -> DisciplineRanking {
    DisciplineRanking {
        country_score: optional_text(document, &format!("LabelUserCountryScore{discipline}")),
        country_ranking: optional_text(document, &format!("LabelUserCountryRanking{discipline}")),
        world_ranking: optional_text(document, &format!("LabelUserWorldRanking{discipline}")),
        all_time_country_score: optional_text(
            document,
            &format!("LabelAllTimeUserCountryScore{discipline}"),
        ),
        all_time_country_ranking: optional_text(
            document,
            &format!("LabelAllTimeUserCountryRanking{discipline}"),
        ),
        all_time_world_ranking: optional_text(
            document,
            &format!("LabelAllTimeUserWorldRanking{discipline}"),
        ),
    }
}

/// Parse one profile page into exactly one `UserProfile`, or fail.
///
/// The birth date is strict on purpose: an empty anchor means the user hid
/// it, but a non-empty value that is not `YYYY-MM-DD` signals an unexpected
/// page shape and fails the record rather than defaulting.
pub fn parse_profile(user_id: UserId, html: &str) -> Result<UserProfile, ParseError> {
    let document = Html::parse_document(html);

    let name = required_text(&document, "LabelUserName")?;
    let height = required_text(&document, "LabelUserDataHeight")?;
    let weight = required_text(&document, "LabelUserDataWeight")?;
    let country = required_text(&document, "LabelUserCountry")?
        .trim_matches([',', ' '].as_slice())
        .to_string();
    let city = required_text(&document, "LabelUserCity")?;
    let date_string = required_text(&document, "LabelUserDataBirth")?;
    let started_climbing = required_text(&document, "LabelUserDataStartedClimbing")?;
    let occupation = required_text(&document, "LabelUserDataOccupation")?;
    let other_interests = required_text(&document, "LabelUserDataInterrests")?;
    let best_comp_result = required_text(&document, "LabelUserDataBestResult")?;
    let best_climbing_area = required_text(&document, "LabelUserDataBestClimbingArea")?;
    let guide_areas = required_text(&document, "LabelUserDataGuide")?;
    let sponsor = required_text(&document, "LabelUserDataLinks")?;

    let birth_date = if date_string.is_empty() {
        None
    } else {
        Some(
            NaiveDate::parse_from_str(&date_string, "%Y-%m-%d").map_err(|_| {
                ParseError::BadDate {
                    context: "birth date",
                    value: date_string.clone(),
                }
            })?,
        )
    };

    let visits =
        find_element(&document, VISITS_ANCHOR).ok_or(ParseError::MissingElement(VISITS_ANCHOR))?;
    let presentation_visits = visits_segment(visits, 0)?;
    let routes_visits = visits_segment(visits, 2)?;
    let boulders_visits = visits_segment(visits, 4)?;
    let blog_visits = visits_segment(visits, 6)?;
    let total_visits = visits_segment(visits, 8)?;

    Ok(UserProfile {
        user_id,
        name,
        height,
        weight,
        country,
        city,
        birth_date,
        started_climbing,
        occupation,
        other_interests,
        best_comp_result,
        best_climbing_area,
        guide_areas,
        sponsor,
        presentation_visits,
        routes_visits,
        boulders_visits,
        blog_visits,
        total_visits,
        routes: ranking(&document, 'R'),
        boulders: ranking(&document, 'B'),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><body>{body}</body></html>")
    }

    const MINIMAL_ANCHORS: &str = r#"
        <span id="LabelUserName">Jane Doe</span>
        <span id="LabelUserDataHeight">170</span>
        <span id="LabelUserDataWeight">55</span>
        <span id="LabelUserCountry">, Sweden</span>
        <span id="LabelUserCity">Stockholm</span>
        <span id="LabelUserDataStartedClimbing">2005</span>
        <span id="LabelUserDataOccupation">Engineer</span>
        <span id="LabelUserDataInterrests">Skiing</span>
        <span id="LabelUserDataBestResult">1st Nationals</span>
        <span id="LabelUserDataBestClimbingArea">Fontainebleau</span>
        <span id="LabelUserDataGuide">Bohuslan</span>
        <span id="LabelUserDataLinks">Acme Gear</span>
        <span id="LabelUserUpdatesVisits">Presentation: 10<br>Routes: 5<br>Boulders: 3<br>Blog: 1<br><b>Total: 19</b></span>
    "#;

    fn with_birth(date: &str) -> String {
        page(&format!(
            r#"{MINIMAL_ANCHORS}<span id="LabelUserDataBirth">{date}</span>"#
        ))
    }

    #[test]
    fn empty_birth_date_is_absent_not_an_error() {
        let profile = parse_profile(1, &with_birth("")).expect("parse");
        assert_eq!(profile.birth_date, None);
        assert_eq!(profile.name, "Jane Doe");
    }

    #[test]
    fn malformed_birth_date_is_a_hard_failure() {
        let err = parse_profile(1, &with_birth("12.05.1990")).expect_err("must fail");
        assert_eq!(
            err,
            ParseError::BadDate {
                context: "birth date",
                value: "12.05.1990".into()
            }
        );
    }

    #[test]
    fn missing_name_fails_the_parse() {
        let html = page(r#"<span id="LabelUserDataHeight">170</span>"#);
        let err = parse_profile(1, &html).expect_err("must fail");
        assert_eq!(err, ParseError::MissingElement("LabelUserName"));
    }

    #[test]
    fn absent_ranking_anchors_default_to_empty() {
        let profile = parse_profile(1, &with_birth("1990-05-12")).expect("parse");
        assert_eq!(profile.routes, DisciplineRanking::default());
        assert_eq!(profile.boulders, DisciplineRanking::default());
    }

    #[test]
    fn country_sheds_leading_commas_and_spaces() {
        let profile = parse_profile(1, &with_birth("1990-05-12")).expect("parse");
        assert_eq!(profile.country, "Sweden");
    }

    #[test]
    fn visits_are_read_by_fixed_position() {
        let profile = parse_profile(1, &with_birth("1990-05-12")).expect("parse");
        assert_eq!(profile.presentation_visits, "10");
        assert_eq!(profile.routes_visits, "5");
        assert_eq!(profile.boulders_visits, "3");
        assert_eq!(profile.blog_visits, "1");
        assert_eq!(profile.total_visits, "19");
    }
}
