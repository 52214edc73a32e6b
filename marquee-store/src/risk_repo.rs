use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marquee_booking::risk::RiskFactor;
use marquee_booking::{RepositoryError, RiskAssessment, RiskAssessmentRepository};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const ASSESSMENT_COLUMNS: &str = "id, booking_id, risk_score, risk_level, risk_factors, requires_review, \
     auto_block, review_status, reviewer_notes, reviewed_by, reviewed_at, created_at, superseded_at, version";

pub struct PgRiskRepository {
    pool: PgPool,
}

impl PgRiskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: Uuid,
    booking_id: Uuid,
    risk_score: i32,
    risk_level: String,
    risk_factors: Json<Vec<RiskFactor>>,
    requires_review: bool,
    auto_block: bool,
    review_status: String,
    reviewer_notes: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    superseded_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<AssessmentRow> for RiskAssessment {
    type Error = RepositoryError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(RiskAssessment {
            id: row.id,
            booking_id: row.booking_id,
            risk_score: row.risk_score.clamp(0, 100) as u32,
            risk_level: row.risk_level.parse().map_err(|e| RepositoryError::Backend(format!("{}", e)))?,
            risk_factors: row.risk_factors.0,
            requires_review: row.requires_review,
            auto_block: row.auto_block,
            review_status: row.review_status.parse().map_err(|e| RepositoryError::Backend(format!("{}", e)))?,
            reviewer_notes: row.reviewer_notes,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
            superseded_at: row.superseded_at,
            version: row.version as u64,
        })
    }
}

fn backend(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Backend(e.to_string())
}

#[async_trait]
impl RiskAssessmentRepository for PgRiskRepository {
    async fn insert_current(&self, assessment: &RiskAssessment) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "UPDATE risk_assessments SET superseded_at = $2 WHERE booking_id = $1 AND superseded_at IS NULL",
        )
        .bind(assessment.booking_id)
        .bind(assessment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO risk_assessments (
                id, booking_id, risk_score, risk_level, risk_factors, requires_review, auto_block,
                review_status, reviewer_notes, reviewed_by, reviewed_at, created_at, superseded_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL, $13)
            "#,
        )
        .bind(assessment.id)
        .bind(assessment.booking_id)
        .bind(assessment.risk_score as i32)
        .bind(assessment.risk_level.as_str())
        .bind(Json(&assessment.risk_factors))
        .bind(assessment.requires_review)
        .bind(assessment.auto_block)
        .bind(assessment.review_status.as_str())
        .bind(&assessment.reviewer_notes)
        .bind(&assessment.reviewed_by)
        .bind(assessment.reviewed_at)
        .bind(assessment.created_at)
        .bind(assessment.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError> {
        let sql = format!("SELECT {} FROM risk_assessments WHERE id = $1", ASSESSMENT_COLUMNS);
        let row: Option<AssessmentRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(RiskAssessment::try_from).transpose()
    }

    async fn current_for_booking(&self, booking_id: Uuid) -> Result<Option<RiskAssessment>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM risk_assessments WHERE booking_id = $1 AND superseded_at IS NULL",
            ASSESSMENT_COLUMNS
        );
        let row: Option<AssessmentRow> = sqlx::query_as(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(RiskAssessment::try_from).transpose()
    }

    async fn update_review(&self, assessment: &mut RiskAssessment, expected_version: u64) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE risk_assessments SET
                review_status = $3,
                reviewer_notes = $4,
                reviewed_by = $5,
                reviewed_at = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(assessment.id)
        .bind(expected_version as i64)
        .bind(assessment.review_status.as_str())
        .bind(&assessment.reviewer_notes)
        .bind(&assessment.reviewed_by)
        .bind(assessment.reviewed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict(assessment.id));
        }

        assessment.version = expected_version + 1;
        Ok(())
    }
}
