use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        slugify, CourseInstance, CourseInstanceStatus, CourseTemplate, CreateCourseInstanceRequest,
        CreateCourseTemplateRequest, UpdateCourseTemplateRequest,
    },
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, CourseRepository},
};

#[derive(FromRow)]
struct TemplateRow {
    id: String,
    title: String,
    slug: String,
    description: String,
    price_ore: i64,
    duration_minutes: i32,
    default_max_participants: i32,
    image_url: Option<String>,
    active: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct InstanceRow {
    id: String,
    template_id: String,
    starts_at: NaiveDateTime,
    ends_at: NaiveDateTime,
    max_participants: i32,
    current_participants: i32,
    status: String,
    notes: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const TEMPLATE_COLUMNS: &str = r#"
    id, title, slug, description, price_ore, duration_minutes,
    default_max_participants, image_url, active, created_at, updated_at
"#;

const INSTANCE_COLUMNS: &str = r#"
    id, template_id, starts_at, ends_at, max_participants,
    current_participants, status, notes, created_at, updated_at
"#;

pub struct SqliteCourseRepository {
    pool: SqlitePool,
}

impl SqliteCourseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_template(row: TemplateRow) -> Result<CourseTemplate> {
        Ok(CourseTemplate {
            id: parse_uuid(&row.id)?,
            title: row.title,
            slug: row.slug,
            description: row.description,
            price_ore: row.price_ore,
            duration_minutes: row.duration_minutes,
            default_max_participants: row.default_max_participants,
            image_url: row.image_url,
            active: row.active,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    fn row_to_instance(row: InstanceRow) -> Result<CourseInstance> {
        Ok(CourseInstance {
            id: parse_uuid(&row.id)?,
            template_id: parse_uuid(&row.template_id)?,
            starts_at: to_utc(row.starts_at),
            ends_at: to_utc(row.ends_at),
            max_participants: row.max_participants,
            current_participants: row.current_participants,
            status: CourseInstanceStatus::parse(&row.status)?,
            notes: row.notes,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

/// Instance lookup usable inside a checkout transaction.
pub(crate) async fn find_instance_in(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<(CourseInstance, CourseTemplate)>> {
    let instance = sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {} FROM course_instances WHERE id = ?",
        INSTANCE_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(instance) = instance else {
        return Ok(None);
    };
    let instance = SqliteCourseRepository::row_to_instance(instance)?;

    let template = sqlx::query_as::<_, TemplateRow>(&format!(
        "SELECT {} FROM course_templates WHERE id = ?",
        TEMPLATE_COLUMNS
    ))
    .bind(instance.template_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some((instance, SqliteCourseRepository::row_to_template(template)?)))
}

/// Participants on bookings that hold a seat: confirmed ones, plus pending
/// ones whose payment is still outstanding.
pub(crate) async fn reserved_participants_in(
    conn: &mut SqliteConnection,
    course_instance_id: Uuid,
) -> Result<i32> {
    let reserved = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(participants), 0)
        FROM bookings
        WHERE course_instance_id = ? AND status IN ('Pending', 'Confirmed')
        "#
    )
    .bind(course_instance_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok(reserved as i32)
}

pub(crate) async fn recount_participants_in(
    conn: &mut SqliteConnection,
    course_instance_id: Uuid,
) -> Result<i32> {
    let confirmed = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COALESCE(SUM(participants), 0)
        FROM bookings
        WHERE course_instance_id = ? AND status = 'Confirmed'
        "#
    )
    .bind(course_instance_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE course_instances SET current_participants = ?, updated_at = ? WHERE id = ?")
        .bind(confirmed)
        .bind(Utc::now().naive_utc())
        .bind(course_instance_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(confirmed as i32)
}

#[async_trait]
impl CourseRepository for SqliteCourseRepository {
    async fn create_template(&self, request: CreateCourseTemplateRequest) -> Result<CourseTemplate> {
        let id = Uuid::new_v4();
        let slug = request
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&request.title));
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO course_templates (
                id, title, slug, description, price_ore, duration_minutes,
                default_max_participants, image_url, active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.title)
        .bind(&slug)
        .bind(&request.description)
        .bind(request.price_ore)
        .bind(request.duration_minutes)
        .bind(request.default_max_participants)
        .bind(&request.image_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.message().contains("UNIQUE") => {
                AppError::Conflict(format!("A course with slug '{}' already exists", slug))
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_template(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created course template".to_string())
        })
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<CourseTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM course_templates WHERE id = ?",
            TEMPLATE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_template).transpose()
    }

    async fn find_template_by_slug(&self, slug: &str) -> Result<Option<CourseTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM course_templates WHERE slug = ?",
            TEMPLATE_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_template).transpose()
    }

    async fn list_templates(&self, active_only: bool) -> Result<Vec<CourseTemplate>> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM course_templates WHERE (? = 0 OR active = 1) ORDER BY title",
            TEMPLATE_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_template).collect()
    }

    async fn update_template(&self, id: Uuid, update: UpdateCourseTemplateRequest) -> Result<CourseTemplate> {
        let current = self.find_template(id).await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        sqlx::query(
            r#"
            UPDATE course_templates
            SET title = ?,
                description = ?,
                price_ore = ?,
                duration_minutes = ?,
                default_max_participants = ?,
                image_url = ?,
                active = ?,
                updated_at = ?
            WHERE id = ?
            "#
        )
        .bind(update.title.unwrap_or(current.title))
        .bind(update.description.unwrap_or(current.description))
        .bind(update.price_ore.unwrap_or(current.price_ore))
        .bind(update.duration_minutes.unwrap_or(current.duration_minutes))
        .bind(update.default_max_participants.unwrap_or(current.default_max_participants))
        .bind(update.image_url.or(current.image_url))
        .bind(update.active.unwrap_or(current.active))
        .bind(Utc::now().naive_utc())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find_template(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated course template".to_string())
        })
    }

    async fn delete_template(&self, id: Uuid) -> Result<()> {
        let bookings = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM bookings b
            JOIN course_instances ci ON ci.id = b.course_instance_id
            WHERE ci.template_id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        if bookings > 0 {
            return Err(AppError::Conflict(
                "Course has bookings; deactivate it instead".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM course_instances WHERE template_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM course_templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Course not found".to_string()));
        }
        Ok(())
    }

    async fn create_instance(&self, request: CreateCourseInstanceRequest) -> Result<CourseInstance> {
        let template = self.find_template(request.template_id).await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        let ends_at = request
            .ends_at
            .unwrap_or_else(|| request.starts_at + Duration::minutes(template.duration_minutes as i64));
        if ends_at <= request.starts_at {
            return Err(AppError::Validation("End time must be after start time".to_string()));
        }
        let max_participants = request.max_participants.unwrap_or(template.default_max_participants);
        if max_participants < 1 {
            return Err(AppError::Validation("Participant limit must be at least 1".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO course_instances (
                id, template_id, starts_at, ends_at, max_participants,
                current_participants, status, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, 'Scheduled', ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(template.id.to_string())
        .bind(request.starts_at.naive_utc())
        .bind(ends_at.naive_utc())
        .bind(max_participants)
        .bind(&request.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_instance(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created course instance".to_string())
        })
    }

    async fn find_instance(&self, id: Uuid) -> Result<Option<CourseInstance>> {
        let row = sqlx::query_as::<_, InstanceRow>(&format!(
            "SELECT {} FROM course_instances WHERE id = ?",
            INSTANCE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_instance).transpose()
    }

    async fn list_instances_for_template(&self, template_id: Uuid, upcoming_only: bool) -> Result<Vec<CourseInstance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            SELECT {} FROM course_instances
            WHERE template_id = ? AND (? = 0 OR starts_at > ?)
            ORDER BY starts_at
            "#,
            INSTANCE_COLUMNS
        ))
        .bind(template_id.to_string())
        .bind(upcoming_only)
        .bind(Utc::now().naive_utc())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_instance).collect()
    }

    async fn list_upcoming_instances(&self, limit: i64) -> Result<Vec<CourseInstance>> {
        let rows = sqlx::query_as::<_, InstanceRow>(&format!(
            r#"
            SELECT {} FROM course_instances
            WHERE starts_at > ? AND status = 'Scheduled'
            ORDER BY starts_at
            LIMIT ?
            "#,
            INSTANCE_COLUMNS
        ))
        .bind(Utc::now().naive_utc())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_instance).collect()
    }

    async fn set_instance_status(&self, id: Uuid, status: CourseInstanceStatus) -> Result<CourseInstance> {
        let result = sqlx::query("UPDATE course_instances SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().naive_utc())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Course date not found".to_string()));
        }

        self.find_instance(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated course instance".to_string())
        })
    }

    async fn recount_participants(&self, id: Uuid) -> Result<i32> {
        let mut conn = self.pool.acquire().await?;
        recount_participants_in(&mut conn, id).await
    }
}
