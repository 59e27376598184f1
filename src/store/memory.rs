use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime};
use tracing::debug;

use crate::attendance::face::FaceSample;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::store::AttendanceStore;

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(u64, NaiveDate), AttendanceRecord>>,
    faces: RwLock<HashMap<u64, FaceSample>>,
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

fn newest_first(mut records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    records.sort_by(|a, b| b.date.cmp(&a.date).then(a.user_id.cmp(&b.user_id)));
    records
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A few past days for a handful of employees, relative to `today`.
    pub fn with_demo_data(today: NaiveDate) -> Self {
        let store = Self::new();
        let day = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(today);
        let t = |h: u32, m: u32| NaiveTime::from_hms_opt(h, m, 0);

        let rows = [
            (2, "John Employee", day(1), t(8, 30), t(17, 15), Some(8.75), AttendanceStatus::Present),
            (2, "John Employee", day(2), t(8, 45), t(17, 30), Some(8.75), AttendanceStatus::Present),
            (2, "John Employee", day(3), t(9, 0), t(12, 0), Some(3.0), AttendanceStatus::HalfDay),
            (3, "Jane Smith", day(1), t(8, 15), t(16, 45), Some(8.5), AttendanceStatus::Present),
            (4, "Mike Johnson", day(1), t(8, 0), t(17, 0), Some(9.0), AttendanceStatus::Present),
            (5, "Sarah Williams", day(1), None, None, None, AttendanceStatus::Absent),
        ];

        if let Ok(mut records) = store.records.write() {
            for (user_id, name, date, clock_in, clock_out, hours, status) in rows {
                let mut record = AttendanceRecord::skeleton(user_id, name, date);
                record.clock_in_time = clock_in;
                record.clock_out_time = clock_out;
                record.total_hours = hours;
                record.status = Some(status);
                records.insert((user_id, date), record);
            }
        }
        store
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn load_today(&self, user_id: u64, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&(user_id, date)).cloned())
    }

    async fn load_history(&self, user_id: u64) -> Result<Vec<AttendanceRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(newest_first(
            records.values().filter(|r| r.user_id == user_id).cloned().collect(),
        ))
    }

    async fn load_all(&self) -> Result<Vec<AttendanceRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(newest_first(records.values().cloned().collect()))
    }

    async fn save(&self, record: &AttendanceRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        debug!(user_id = record.user_id, date = %record.date, "Saving attendance record");
        records.insert((record.user_id, record.date), record.clone());
        Ok(())
    }

    async fn load_face_reference(&self, user_id: u64) -> Result<Option<FaceSample>> {
        let faces = self.faces.read().map_err(poisoned)?;
        Ok(faces.get(&user_id).cloned())
    }

    async fn save_face_reference(&self, user_id: u64, sample: &FaceSample) -> Result<()> {
        let mut faces = self.faces.write().map_err(poisoned)?;
        faces.insert(user_id, sample.clone());
        Ok(())
    }
}
