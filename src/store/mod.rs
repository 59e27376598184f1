//! Persistence for attendance records and enrolled face references.

pub mod memory;
pub mod mysql;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::attendance::face::FaceSample;
use crate::model::attendance::AttendanceRecord;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn load_today(&self, user_id: u64, date: NaiveDate) -> Result<Option<AttendanceRecord>>;

    /// All of a user's records, newest first.
    async fn load_history(&self, user_id: u64) -> Result<Vec<AttendanceRecord>>;

    /// Every user's records, newest first.
    async fn load_all(&self) -> Result<Vec<AttendanceRecord>>;

    /// Inserts or replaces the record for its (user, date).
    async fn save(&self, record: &AttendanceRecord) -> Result<()>;

    async fn load_face_reference(&self, user_id: u64) -> Result<Option<FaceSample>>;

    async fn save_face_reference(&self, user_id: u64, sample: &FaceSample) -> Result<()>;
}
