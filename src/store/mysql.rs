use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{FromRow, MySqlPool};
use tracing::{debug, error};

use crate::attendance::face::FaceSample;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, PeriodMark};
use crate::model::geo::GeoPoint;
use crate::store::AttendanceStore;

const RECORD_COLUMNS: &str = r#"
    id, user_id, user_name, date, clock_in_time, clock_out_time, total_hours, status,
    clock_in_lat, clock_in_lng, clock_out_lat, clock_out_lng
"#;

#[derive(FromRow)]
struct RecordRow {
    id: String,
    user_id: u64,
    user_name: String,
    date: NaiveDate,
    clock_in_time: Option<NaiveTime>,
    clock_out_time: Option<NaiveTime>,
    total_hours: Option<f64>,
    status: Option<String>,
    clock_in_lat: Option<f64>,
    clock_in_lng: Option<f64>,
    clock_out_lat: Option<f64>,
    clock_out_lng: Option<f64>,
}

#[derive(FromRow)]
struct MarkRow {
    record_id: String,
    period_id: u32,
    marked_at: NaiveTime,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
        _ => None,
    }
}

impl RecordRow {
    fn into_record(self, period_marks: Vec<PeriodMark>) -> Result<AttendanceRecord> {
        let status = self
            .status
            .as_deref()
            .map(AttendanceStatus::from_str)
            .transpose()
            .with_context(|| format!("invalid status on attendance record {}", self.id))?;

        Ok(AttendanceRecord {
            id: self.id,
            user_id: self.user_id,
            user_name: self.user_name,
            date: self.date,
            clock_in_time: self.clock_in_time,
            clock_out_time: self.clock_out_time,
            total_hours: self.total_hours,
            status,
            clock_in_location: point(self.clock_in_lat, self.clock_in_lng),
            clock_out_location: point(self.clock_out_lat, self.clock_out_lng),
            period_marks,
        })
    }
}

impl From<MarkRow> for PeriodMark {
    fn from(row: MarkRow) -> Self {
        PeriodMark {
            period_id: row.period_id,
            marked_at: row.marked_at,
            present: true,
            location: point(row.latitude, row.longitude),
        }
    }
}

/// Expects the tables from `sql/schema.sql`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Joins records with their marks, keeping the row order of `rows`.
    fn assemble(rows: Vec<RecordRow>, marks: Vec<MarkRow>) -> Result<Vec<AttendanceRecord>> {
        let mut by_record: HashMap<String, Vec<PeriodMark>> = HashMap::new();
        for mark in marks {
            by_record.entry(mark.record_id.clone()).or_default().push(mark.into());
        }

        rows.into_iter()
            .map(|row| {
                let marks = by_record.remove(&row.id).unwrap_or_default();
                row.into_record(marks)
            })
            .collect()
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn load_today(&self, user_id: u64, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_id = ? AND date = ?");
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load today's attendance record")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let marks = sqlx::query_as::<_, MarkRow>(
            r#"
            SELECT record_id, period_id, marked_at, latitude, longitude
            FROM attendance_period_marks
            WHERE record_id = ?
            ORDER BY marked_at, period_id
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load period marks")?;

        Ok(Self::assemble(vec![row], marks)?.pop())
    }

    async fn load_history(&self, user_id: u64) -> Result<Vec<AttendanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE user_id = ? ORDER BY date DESC"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to load attendance history")?;

        let marks = sqlx::query_as::<_, MarkRow>(
            r#"
            SELECT m.record_id, m.period_id, m.marked_at, m.latitude, m.longitude
            FROM attendance_period_marks m
            JOIN attendance_records r ON r.id = m.record_id
            WHERE r.user_id = ?
            ORDER BY m.marked_at, m.period_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load period marks")?;

        Self::assemble(rows, marks)
    }

    async fn load_all(&self) -> Result<Vec<AttendanceRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records ORDER BY date DESC, user_id");
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to load attendance records")?;

        let marks = sqlx::query_as::<_, MarkRow>(
            r#"
            SELECT record_id, period_id, marked_at, latitude, longitude
            FROM attendance_period_marks
            ORDER BY marked_at, period_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load period marks")?;

        Self::assemble(rows, marks)
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to open transaction")?;

        sqlx::query(
            r#"
            INSERT INTO attendance_records
                (id, user_id, user_name, date, clock_in_time, clock_out_time, total_hours, status,
                 clock_in_lat, clock_in_lng, clock_out_lat, clock_out_lng)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                clock_in_time = VALUES(clock_in_time),
                clock_out_time = VALUES(clock_out_time),
                total_hours = VALUES(total_hours),
                status = VALUES(status),
                clock_in_lat = VALUES(clock_in_lat),
                clock_in_lng = VALUES(clock_in_lng),
                clock_out_lat = VALUES(clock_out_lat),
                clock_out_lng = VALUES(clock_out_lng)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(&record.user_name)
        .bind(record.date)
        .bind(record.clock_in_time)
        .bind(record.clock_out_time)
        .bind(record.total_hours)
        .bind(record.status.map(|s| s.to_string()))
        .bind(record.clock_in_location.map(|p| p.latitude))
        .bind(record.clock_in_location.map(|p| p.longitude))
        .bind(record.clock_out_location.map(|p| p.latitude))
        .bind(record.clock_out_location.map(|p| p.longitude))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = record.user_id, date = %record.date, "Failed to save attendance record");
            e
        })
        .context("failed to save attendance record")?;

        // Marks are append-only; existing rows are left as they are.
        for mark in &record.period_marks {
            sqlx::query(
                r#"
                INSERT IGNORE INTO attendance_period_marks
                    (record_id, period_id, marked_at, latitude, longitude)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(mark.period_id)
            .bind(mark.marked_at)
            .bind(mark.location.map(|p| p.latitude))
            .bind(mark.location.map(|p| p.longitude))
            .execute(&mut *tx)
            .await
            .context("failed to save period mark")?;
        }

        tx.commit().await.context("failed to commit attendance record")?;
        debug!(user_id = record.user_id, date = %record.date, marks = record.period_marks.len(), "Attendance record saved");
        Ok(())
    }

    async fn load_face_reference(&self, user_id: u64) -> Result<Option<FaceSample>> {
        let row = sqlx::query_as::<_, (Vec<u8>,)>("SELECT sample FROM face_references WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load face reference")?;

        Ok(row.map(|(bytes,)| FaceSample::new(bytes)))
    }

    async fn save_face_reference(&self, user_id: u64, sample: &FaceSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO face_references (user_id, sample, updated_at)
            VALUES (?, ?, NOW())
            ON DUPLICATE KEY UPDATE sample = VALUES(sample), updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(sample.as_bytes())
        .execute(&self.pool)
        .await
        .context("failed to save face reference")?;

        Ok(())
    }
}
