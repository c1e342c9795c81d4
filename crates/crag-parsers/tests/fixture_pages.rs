//! End-to-end parses of full captured-page fixtures.

use chrono::NaiveDate;
use crag_core::{AscentRecord, AscentStyle};
use crag_parsers::{ascent_records, parse_profile};
use scraper::Html;

const PROFILE_PAGE: &str = include_str!("fixtures/profile_full.html");
const ASCENT_PAGE: &str = include_str!("fixtures/ascent_list.html");

#[test]
fn full_profile_page_round_trips_every_field() {
    let profile = parse_profile(4211, PROFILE_PAGE).expect("profile parses");

    assert_eq!(profile.user_id, 4211);
    assert_eq!(profile.name, "Jane Doe");
    assert_eq!(profile.height, "170");
    assert_eq!(profile.weight, "55");
    assert_eq!(profile.country, "Sweden");
    assert_eq!(profile.city, "Stockholm");
    assert_eq!(profile.birth_date, NaiveDate::from_ymd_opt(1990, 5, 12));
    assert_eq!(profile.started_climbing, "2005");
    assert_eq!(profile.occupation, "Engineer");
    assert_eq!(profile.other_interests, "Skiing, photography");
    assert_eq!(profile.best_comp_result, "1st Nationals 2011");
    assert_eq!(profile.best_climbing_area, "Fontainebleau");
    assert_eq!(profile.guide_areas, "Bohuslan, Vastervik");
    assert_eq!(profile.sponsor, "Acme Gear");

    assert_eq!(profile.presentation_visits, "10");
    assert_eq!(profile.routes_visits, "5");
    assert_eq!(profile.boulders_visits, "3");
    assert_eq!(profile.blog_visits, "1");
    assert_eq!(profile.total_visits, "19");

    assert_eq!(profile.routes.country_score, "8870");
    assert_eq!(profile.routes.country_ranking, "12");
    assert_eq!(profile.routes.world_ranking, "431");
    assert_eq!(profile.routes.all_time_country_score, "9120");
    assert_eq!(profile.routes.all_time_country_ranking, "9");
    assert_eq!(profile.routes.all_time_world_ranking, "388");
    assert_eq!(profile.boulders.country_score, "7455");
    assert_eq!(profile.boulders.country_ranking, "21");
    assert_eq!(profile.boulders.world_ranking, "602");
    assert_eq!(profile.boulders.all_time_country_score, "7800");
    assert_eq!(profile.boulders.all_time_country_ranking, "17");
    assert_eq!(profile.boulders.all_time_world_ranking, "544");
}

#[test]
fn full_ascent_page_yields_sectioned_records_in_page_order() {
    let document = Html::parse_document(ASCENT_PAGE);
    let records: Vec<AscentRecord> = ascent_records(&document, 4211)
        .collect::<Result<_, _>>()
        .expect("all rows parse");

    assert_eq!(records.len(), 3);

    let first = &records[0];
    assert_eq!(first.user_id, 4211);
    assert_eq!(first.name, "Rainbow Rocket");
    assert_eq!(first.grade, "7a");
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2016, 3, 12).unwrap());
    assert_eq!(first.style, AscentStyle::Flash);
    assert!(first.recommended);
    assert_eq!(first.area, "Fontainebleau");
    assert_eq!(first.tags, "SD, crimps");
    assert_eq!(first.comment, "Amazing moves");
    assert_eq!(first.stars, 2);

    let second = &records[1];
    assert_eq!(second.name, "La Marie Rose");
    assert_eq!(second.grade, "7a");
    assert_eq!(second.style, AscentStyle::Redpoint);
    assert!(!second.recommended);
    assert_eq!(second.comment, "");
    assert_eq!(second.stars, 0);

    let third = &records[2];
    assert_eq!(third.name, "Helicopter");
    assert_eq!(third.grade, "6c");
    assert_eq!(third.style, AscentStyle::Onsight);
    assert_eq!(third.stars, 1);
}
