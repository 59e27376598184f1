use crate::api::attendance::{
    ClockInRequest, ClockOutRequest, EnrollFaceRequest, HistoryResponse, TodayResponse,
    VerifiedAttendanceRequest,
};
use crate::api::period::PeriodListResponse;
use crate::attendance::summary::AttendanceSummary;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, PeriodMark};
use crate::model::geo::GeoPoint;
use crate::model::period::Period;
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance API",
        version = "1.0.0",
        description = r#"
## Attendance Tracking

Daily attendance for employees: clock-in and clock-out, per-period marks
checked against a geofence, and face-verified marking.

### Rules
- A period can be marked only while its window is open and only from within
  its radius.
- Each period is marked at most once per day.
- Total hours are computed at clock-out; under 4 hours is a **half-day**.

### Declines
Business rule violations answer **409** with a machine readable `reason`
(`outside_period_window`, `location_mismatch`, `already_marked`,
`face_not_matched`, ...) and a human readable `message`.

### Security
Every endpoint needs a **JWT Bearer** access token.
"#,
    ),
    paths(
        crate::api::attendance::today,
        crate::api::attendance::clock_in,
        crate::api::attendance::clock_out,
        crate::api::attendance::verify,
        crate::api::attendance::enroll_face,
        crate::api::attendance::history,
        crate::api::attendance::all_records,

        crate::api::period::list_periods
    ),
    components(
        schemas(
            ClockInRequest,
            ClockOutRequest,
            VerifiedAttendanceRequest,
            EnrollFaceRequest,
            TodayResponse,
            HistoryResponse,
            AttendanceRecord,
            AttendanceStatus,
            PeriodMark,
            AttendanceSummary,
            GeoPoint,
            Period,
            PeriodListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Attendance tracking APIs"),
        (name = "Periods", description = "Period schedule APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
