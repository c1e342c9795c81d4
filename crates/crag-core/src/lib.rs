//! Core domain model for the crag harvesting pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "crag-core";

/// Site-assigned profile identifier. The only join key across records.
pub type UserId = u32;

/// The two pages captured per identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    Profile,
    AscentList,
}

impl PageKind {
    /// Filename suffix under the capture directory.
    pub fn file_suffix(self) -> &'static str {
        match self {
            PageKind::Profile => "user.html",
            PageKind::AscentList => "boulders.html",
        }
    }

    pub fn capture_file_name(self, user_id: UserId) -> String {
        format!("{}_{}", user_id, self.file_suffix())
    }
}

/// Ranking block for one discipline (routes or boulders). All values are
/// kept as the page's display strings; absent anchors stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplineRanking {
    pub country_score: String,
    pub country_ranking: String,
    pub world_ranking: String,
    pub all_time_country_score: String,
    pub all_time_country_ranking: String,
    pub all_time_world_ranking: String,
}

/// One row of the `Users` table. Scalar fields mirror the profile page's
/// labeled anchors verbatim; only the birth date is typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub name: String,
    pub height: String,
    pub weight: String,
    pub country: String,
    pub city: String,
    pub birth_date: Option<NaiveDate>,
    pub started_climbing: String,
    pub occupation: String,
    pub other_interests: String,
    pub best_comp_result: String,
    pub best_climbing_area: String,
    pub guide_areas: String,
    pub sponsor: String,
    pub presentation_visits: String,
    pub routes_visits: String,
    pub boulders_visits: String,
    pub blog_visits: String,
    pub total_visits: String,
    pub routes: DisciplineRanking,
    pub boulders: DisciplineRanking,
}

/// Icon reference marking a flashed ascent.
pub const FLASH_ICON: &str = "images/56f871c6548ae32aaa78672c1996df7f.gif";
/// Icon reference marking a redpointed ascent.
pub const REDPOINT_ICON: &str = "images/979607b133a6622a1fc3443e564d9577.gif";
/// Icon reference marking a recommended climb.
pub const RECOMMENDED_ICON: &str = "images/UserRecommended_1.gif";

/// Closed ascent-style classification. Any icon reference that is neither
/// the flash nor the redpoint icon counts as an onsight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AscentStyle {
    Flash,
    Redpoint,
    Onsight,
}

impl AscentStyle {
    pub fn from_icon_src(src: &str) -> Self {
        if src == FLASH_ICON {
            AscentStyle::Flash
        } else if src == REDPOINT_ICON {
            AscentStyle::Redpoint
        } else {
            AscentStyle::Onsight
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AscentStyle::Flash => "Flash",
            AscentStyle::Redpoint => "Redpoint",
            AscentStyle::Onsight => "Onsight",
        }
    }
}

/// One row of the `Boulders` table: a single logged climb belonging to one
/// profile. The grade label is only meaningful within the grade section the
/// row was parsed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AscentRecord {
    pub user_id: UserId,
    pub name: String,
    pub grade: String,
    pub date: NaiveDate,
    pub style: AscentStyle,
    pub recommended: bool,
    pub area: String,
    pub tags: String,
    pub comment: String,
    pub stars: u32,
}
