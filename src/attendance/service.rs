//! The attendance application state: one instance is shared by every request
//! and each user's actions are serialized through their session guard.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::attendance::clock::{Clock, SystemClock};
use crate::attendance::error::{AttendanceError, Decline};
use crate::attendance::face::{Camera, FaceComparer, FaceVerifier, MIN_SAMPLE_BYTES, CaptureError};
use crate::attendance::location::{LocationSensor, LocationSettings};
use crate::attendance::schedule::PeriodSchedule;
use crate::attendance::session::{ProcessingGuard, SessionRegistry};
use crate::attendance::state;
use crate::model::attendance::AttendanceRecord;
use crate::model::geo::GeoPoint;
use crate::model::period::Period;
use crate::model::user::User;
use crate::store::AttendanceStore;

const EVENT_CAPACITY: usize = 256;
const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttendanceEventKind {
    ClockedIn,
    PeriodMarked { period_id: u32 },
    ClockedOut,
}

/// Sent to subscribers after every applied action.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEvent {
    pub kind: AttendanceEventKind,
    pub record: AttendanceRecord,
}

pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    schedule: Arc<PeriodSchedule>,
    verifier: FaceVerifier,
    clock: Arc<dyn Clock>,
    location: LocationSettings,
    sessions: SessionRegistry,
    events: broadcast::Sender<AttendanceEvent>,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        schedule: Arc<PeriodSchedule>,
        comparer: Arc<dyn FaceComparer>,
        location: LocationSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            schedule,
            verifier: FaceVerifier::new(comparer),
            clock: Arc::new(SystemClock),
            location,
            sessions: SessionRegistry::new(DEFAULT_SESSION_IDLE),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session_idle(mut self, idle: Duration) -> Self {
        self.sessions = SessionRegistry::new(idle);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date()
    }

    pub fn schedule(&self) -> &PeriodSchedule {
        &self.schedule
    }

    pub fn current_period(&self) -> Option<&Period> {
        self.schedule.current_period(self.clock.now().time())
    }

    pub fn next_period(&self) -> Option<&Period> {
        self.schedule.next_period(self.clock.now().time())
    }

    pub fn is_processing(&self, user_id: u64) -> bool {
        self.sessions.is_processing(user_id)
    }

    /// Today's stored record, or an unsaved empty one.
    pub async fn today_record(&self, user: &User) -> Result<AttendanceRecord, AttendanceError> {
        self.load_or_skeleton(user, self.today()).await
    }

    /// The user's past days, newest first; today is excluded.
    pub async fn history(&self, user: &User) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let today = self.today();
        let mut records = self.store.load_history(user.id).await?;
        records.retain(|r| r.date != today);
        Ok(records)
    }

    /// Every user's records, newest first. Admin only.
    pub async fn all_records(&self, user: &User) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        if !user.is_admin() {
            warn!(user_id = user.id, "Non-admin requested organization-wide attendance");
            return Err(AttendanceError::Forbidden("Admin only"));
        }
        Ok(self.store.load_all().await?)
    }

    /// Clocks in for the day, or marks `period_id` when given.
    #[instrument(name = "clock_in", skip(self, user, sensor), fields(user_id = user.id))]
    pub async fn clock_in(
        &self,
        user: &User,
        period_id: Option<u32>,
        sensor: &dyn LocationSensor,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let _guard = self.begin(user.id).await?;

        let now = self.clock.now();
        let location = self.locate(sensor).await?;
        let mut record = self.load_or_skeleton(user, now.date()).await?;
        let kind = self.apply_clock_in(&mut record, period_id, now, location)?;

        self.commit(kind, record).await
    }

    #[instrument(name = "clock_out", skip(self, user, sensor), fields(user_id = user.id))]
    pub async fn clock_out(
        &self,
        user: &User,
        sensor: &dyn LocationSensor,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let _guard = self.begin(user.id).await?;

        let today = self.today();
        let mut record = match self.store.load_today(user.id, today).await? {
            Some(r) if r.clock_in_time.is_some() => r,
            _ => {
                info!("Clock-out declined: no active session");
                return Err(Decline::NoActiveSession.into());
            }
        };

        let now = self.clock.now();
        let location = self.locate(sensor).await?;
        state::clock_out(&mut record, now.time(), location).inspect_err(|d| {
            info!(reason = d.reason(), "Clock-out declined");
        })?;

        self.commit(AttendanceEventKind::ClockedOut, record).await
    }

    /// Face check, then location, then the same validation and transition as
    /// [`Self::clock_in`]. Any failing step stops the remaining ones.
    #[instrument(name = "verified_attendance", skip(self, user, sensor, camera), fields(user_id = user.id))]
    pub async fn mark_attendance_with_verification(
        &self,
        user: &User,
        period_id: Option<u32>,
        sensor: &dyn LocationSensor,
        camera: &dyn Camera,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let _guard = self.begin(user.id).await?;

        let reference = self
            .store
            .load_face_reference(user.id)
            .await?
            .ok_or(Decline::FaceNotEnrolled)?;

        let verification = self.verifier.verify(camera, &reference).await?;
        if !verification.matched {
            info!(score = verification.score, "Face not matched");
            return Err(Decline::FaceNotMatched {
                score: verification.score,
            }
            .into());
        }
        debug!(score = verification.score, "Face matched");

        let location = self.locate(sensor).await?;
        let now = self.clock.now();
        let mut record = self.load_or_skeleton(user, now.date()).await?;
        let kind = self.apply_clock_in(&mut record, period_id, now, location)?;

        self.commit(kind, record).await
    }

    /// Captures and stores the user's reference face.
    #[instrument(name = "enroll_face", skip(self, user, camera), fields(user_id = user.id))]
    pub async fn enroll_face(&self, user: &User, camera: &dyn Camera) -> Result<(), AttendanceError> {
        let _guard = self.begin(user.id).await?;

        let sample = self.verifier.capture(camera).await?;
        if sample.len() < MIN_SAMPLE_BYTES {
            return Err(CaptureError::InvalidFrame(format!(
                "reference face needs at least {MIN_SAMPLE_BYTES} bytes"
            ))
            .into());
        }

        self.store.save_face_reference(user.id, &sample).await?;
        info!(bytes = sample.len(), "Face reference enrolled");
        Ok(())
    }

    async fn begin(&self, user_id: u64) -> Result<ProcessingGuard, AttendanceError> {
        self.sessions
            .try_begin(user_id)
            .await
            .ok_or_else(|| {
                info!(user_id, "Action rejected: another one is in progress");
                Decline::ActionInProgress.into()
            })
    }

    async fn locate(&self, sensor: &dyn LocationSensor) -> Result<GeoPoint, AttendanceError> {
        self.location.locate(sensor).await.map_err(|e| {
            warn!(error = %e, "Location unavailable");
            AttendanceError::LocationUnavailable(e.to_string())
        })
    }

    async fn load_or_skeleton(&self, user: &User, date: NaiveDate) -> Result<AttendanceRecord, AttendanceError> {
        Ok(self
            .store
            .load_today(user.id, date)
            .await?
            .unwrap_or_else(|| AttendanceRecord::skeleton(user.id, &user.name, date)))
    }

    fn apply_clock_in(
        &self,
        record: &mut AttendanceRecord,
        period_id: Option<u32>,
        now: NaiveDateTime,
        location: GeoPoint,
    ) -> Result<AttendanceEventKind, AttendanceError> {
        let outcome = match period_id {
            Some(id) => self
                .schedule
                .get(id)
                .ok_or(Decline::PeriodNotFound { period_id: id })
                .and_then(|period| state::mark_period(record, period, now.time(), location))
                .map(|_| AttendanceEventKind::PeriodMarked { period_id: id }),
            None => state::clock_in(record, now.time(), location).map(|_| AttendanceEventKind::ClockedIn),
        };

        outcome.map_err(|d| {
            info!(reason = d.reason(), period_id, "Clock-in declined");
            d.into()
        })
    }

    async fn commit(&self, kind: AttendanceEventKind, record: AttendanceRecord) -> Result<AttendanceRecord, AttendanceError> {
        self.store.save(&record).await?;
        info!(
            event = ?kind,
            date = %record.date,
            status = ?record.status,
            total_hours = ?record.total_hours,
            "Attendance updated"
        );

        // No subscribers is fine.
        let _ = self.events.send(AttendanceEvent {
            kind,
            record: record.clone(),
        });
        Ok(record)
    }
}
