use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

/// Reusable definition of a course: what it is and what it costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseTemplate {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_ore: i64,
    pub duration_minutes: i32,
    pub default_max_participants: i32,
    pub image_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scheduled occurrence of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_participants: i32,
    pub current_participants: i32,
    pub status: CourseInstanceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseInstance {
    pub fn spots_left(&self) -> i32 {
        (self.max_participants - self.current_participants).max(0)
    }

    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        self.status == CourseInstanceStatus::Scheduled
            && self.starts_at > now
            && self.spots_left() > 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseInstanceStatus {
    Scheduled,
    Cancelled,
}

impl CourseInstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseInstanceStatus::Scheduled => "Scheduled",
            CourseInstanceStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Scheduled" => Ok(CourseInstanceStatus::Scheduled),
            "Cancelled" => Ok(CourseInstanceStatus::Cancelled),
            _ => Err(AppError::Database(format!("Invalid course instance status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCourseTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub title: String,
    pub slug: Option<String>,
    #[validate(length(max = 10000))]
    pub description: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub price_ore: i64,
    #[validate(range(min = 15, max = 1440, message = "must be 15-1440 minutes"))]
    pub duration_minutes: i32,
    #[validate(range(min = 1, max = 100, message = "must be 1-100"))]
    pub default_max_participants: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCourseTemplateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_ore: Option<i64>,
    pub duration_minutes: Option<i32>,
    pub default_max_participants: Option<i32>,
    pub image_url: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseInstanceRequest {
    pub template_id: Uuid,
    pub starts_at: DateTime<Utc>,
    /// Defaults to `starts_at + template.duration_minutes`.
    pub ends_at: Option<DateTime<Utc>>,
    /// Defaults to the template's participant limit.
    pub max_participants: Option<i32>,
    pub notes: Option<String>,
}

/// The studio's wall clock, whatever zone the server runs in.
pub const STUDIO_TZ: chrono_tz::Tz = chrono_tz::Europe::Stockholm;

/// `2026-03-14 18:00` in Stockholm time.
pub fn format_local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&STUDIO_TZ).format("%Y-%m-%d %H:%M").to_string()
}

/// Parses an HTML `datetime-local` value (`2026-03-14T18:00`) as Stockholm time.
/// Times inside the spring-forward gap do not exist and yield `None`; during the
/// autumn overlap the earlier instant wins.
pub fn parse_local_datetime(value: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M").ok()?;
    naive
        .and_local_timezone(STUDIO_TZ)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Lowercase ASCII slug; Swedish letters are transliterated.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for ch in input.trim().to_lowercase().chars() {
        let mapped = match ch {
            'å' | 'ä' | 'à' | 'á' => Some('a'),
            'ö' | 'ø' | 'ó' => Some('o'),
            'é' | 'è' => Some('e'),
            c if c.is_ascii_alphanumeric() => Some(c),
            _ => None,
        };
        match mapped {
            Some(c) => {
                slug.push(c);
                last_dash = false;
            }
            None if !last_dash => {
                slug.push('-');
                last_dash = true;
            }
            None => {}
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn instance(max: i32, current: i32, starts_in_hours: i64) -> CourseInstance {
        let now = Utc::now();
        CourseInstance {
            id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            starts_at: now + Duration::hours(starts_in_hours),
            ends_at: now + Duration::hours(starts_in_hours + 3),
            max_participants: max,
            current_participants: current,
            status: CourseInstanceStatus::Scheduled,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Drejning för nybörjare"), "drejning-for-nyborjare");
        assert_eq!(slugify("  Raku -- kväll! "), "raku-kvall");
    }

    #[test]
    fn test_local_times_are_stockholm() {
        let winter = parse_local_datetime("2026-01-15T18:00").unwrap();
        assert_eq!(winter.to_rfc3339(), "2026-01-15T17:00:00+00:00");
        let summer = parse_local_datetime("2026-07-01T18:00").unwrap();
        assert_eq!(summer.to_rfc3339(), "2026-07-01T16:00:00+00:00");
        assert_eq!(format_local(summer), "2026-07-01 18:00");

        assert!(parse_local_datetime("2026-03-29T02:30").is_none());
        let overlap = parse_local_datetime("2026-10-25T02:30").unwrap();
        assert_eq!(overlap.to_rfc3339(), "2026-10-25T00:30:00+00:00");
        assert!(parse_local_datetime("next tuesday").is_none());
    }

    #[test]
    fn test_bookable() {
        let now = Utc::now();
        assert!(instance(8, 3, 24).is_bookable(now));
        assert!(!instance(8, 8, 24).is_bookable(now));
        assert!(!instance(8, 0, -1).is_bookable(now));

        let mut cancelled = instance(8, 0, 24);
        cancelled.status = CourseInstanceStatus::Cancelled;
        assert!(!cancelled.is_bookable(now));
    }

    #[test]
    fn test_spots_left_never_negative() {
        assert_eq!(instance(4, 6, 24).spots_left(), 0);
    }

    #[test]
    fn test_parse_local_datetime_roundtrips_display() {
        let parsed = parse_local_datetime("2026-03-14T18:00").unwrap();
        assert_eq!(format_local(parsed), "2026-03-14 18:00");
        assert!(parse_local_datetime("14/3 18:00").is_none());
    }
}
