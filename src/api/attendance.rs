use crate::{
    attendance::{
        AttendanceService,
        face::{FaceSample, SubmittedFrameCamera},
        location::ReportedLocation,
        state::{self, DayPhase},
        summary::{self, AttendanceSummary},
    },
    auth::auth::AuthUser,
    model::{attendance::AttendanceRecord, period::Period},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ClockInRequest {
    /// Mark this scheduled period instead of a whole-day clock-in
    #[schema(example = 1, nullable = true)]
    pub period_id: Option<u32>,
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct ClockOutRequest {
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifiedAttendanceRequest {
    #[schema(example = 1, nullable = true)]
    pub period_id: Option<u32>,
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
    /// Captured frame, base64 or a `data:image/jpeg;base64,` URL
    #[schema(example = "data:image/jpeg;base64,/9j/4AAQSkZJRg...", nullable = true)]
    pub face_image: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct EnrollFaceRequest {
    #[schema(example = "data:image/jpeg;base64,/9j/4AAQSkZJRg...")]
    pub face_image: String,
}

#[derive(Serialize, ToSchema)]
pub struct TodayResponse {
    pub record: AttendanceRecord,
    #[schema(example = "in_progress")]
    pub phase: String,
    pub is_clocked_in: bool,
    /// An attendance action for this user is still running
    pub is_processing: bool,
    #[schema(nullable = true)]
    pub current_period: Option<Period>,
    #[schema(nullable = true)]
    pub next_period: Option<Period>,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub data: Vec<AttendanceRecord>,
    pub summary: AttendanceSummary,
}

fn camera_for(face_image: Option<&str>) -> Result<SubmittedFrameCamera, crate::attendance::AttendanceError> {
    let frame = face_image.map(FaceSample::from_base64).transpose()?;
    Ok(SubmittedFrameCamera::new(frame))
}

/// Today's attendance
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's record, or an empty one", body = TodayResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<HttpResponse> {
    let user = auth.user();
    let record = service.today_record(&user).await?;
    let phase: DayPhase = state::phase(&record);

    Ok(HttpResponse::Ok().json(TodayResponse {
        phase: phase.to_string(),
        is_clocked_in: record.is_clocked_in(),
        is_processing: service.is_processing(user.id),
        current_period: service.current_period().cloned(),
        next_period: service.next_period().cloned(),
        record,
    }))
}

/// Clock in, or mark a period
#[utoipa::path(
    post,
    path = "/api/attendance/clock-in",
    request_body = ClockInRequest,
    responses(
        (status = 200, description = "Clocked in", body = AttendanceRecord),
        (status = 409, description = "Declined", body = Object, example = json!({
            "reason": "outside_period_window",
            "period_id": 1,
            "start": "08:00",
            "end": "08:50",
            "now": "09:10",
            "message": "period 1 is open 08:00-08:50, it is now 09:10"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Location unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<ClockInRequest>,
) -> actix_web::Result<HttpResponse> {
    let sensor = ReportedLocation::new(payload.latitude, payload.longitude);
    let record = service.clock_in(&auth.user(), payload.period_id, &sensor).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Clock out
#[utoipa::path(
    post,
    path = "/api/attendance/clock-out",
    request_body = ClockOutRequest,
    responses(
        (status = 200, description = "Clocked out", body = AttendanceRecord),
        (status = 409, description = "Declined", body = Object, example = json!({
            "reason": "no_active_session",
            "message": "no active clock-in for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Location unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn clock_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<ClockOutRequest>,
) -> actix_web::Result<HttpResponse> {
    let sensor = ReportedLocation::new(payload.latitude, payload.longitude);
    let record = service.clock_out(&auth.user(), &sensor).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Face-verified attendance
#[utoipa::path(
    post,
    path = "/api/attendance/verify",
    request_body = VerifiedAttendanceRequest,
    responses(
        (status = 200, description = "Attendance marked", body = AttendanceRecord),
        (status = 409, description = "Declined", body = Object, example = json!({
            "reason": "face_not_matched",
            "score": 0.62,
            "message": "face not matched (similarity 0.62)"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Camera or location unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn verify(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<VerifiedAttendanceRequest>,
) -> actix_web::Result<HttpResponse> {
    let camera = camera_for(payload.face_image.as_deref())?;
    let sensor = ReportedLocation::new(payload.latitude, payload.longitude);

    let record = service
        .mark_attendance_with_verification(&auth.user(), payload.period_id, &sensor, &camera)
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Enroll the reference face
#[utoipa::path(
    put,
    path = "/api/attendance/face",
    request_body = EnrollFaceRequest,
    responses(
        (status = 200, description = "Face enrolled", body = Object, example = json!({
            "message": "Face enrolled"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Invalid or missing frame")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn enroll_face(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<EnrollFaceRequest>,
) -> actix_web::Result<HttpResponse> {
    let camera = camera_for(Some(&payload.face_image))?;
    service.enroll_face(&auth.user(), &camera).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Face enrolled" })))
}

/// Own attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    responses(
        (status = 200, description = "Past days, newest first", body = HistoryResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<HttpResponse> {
    let records = service.history(&auth.user()).await?;
    debug!(user_id = auth.user_id, count = records.len(), "Attendance history loaded");

    Ok(HttpResponse::Ok().json(HistoryResponse {
        summary: summary::summarize(&records),
        data: records,
    }))
}

/// Attendance of every employee
#[utoipa::path(
    get,
    path = "/api/attendance/all",
    responses(
        (status = 200, description = "All records, newest first", body = HistoryResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn all_records(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let records = service.all_records(&auth.user()).await?;
    Ok(HttpResponse::Ok().json(HistoryResponse {
        summary: summary::summarize(&records),
        data: records,
    }))
}
