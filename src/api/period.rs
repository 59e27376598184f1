use crate::{attendance::AttendanceService, auth::auth::AuthUser, model::period::Period};
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct PeriodListResponse {
    pub data: Vec<Period>,
    /// Period whose window contains the current time
    #[schema(nullable = true)]
    pub current: Option<Period>,
    /// Earliest period that has not started yet today
    #[schema(nullable = true)]
    pub next: Option<Period>,
}

/// Today's period schedule
#[utoipa::path(
    get,
    path = "/api/periods",
    responses(
        (status = 200, description = "Scheduled periods in start order", body = PeriodListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Periods"
)]
pub async fn list_periods(_auth: AuthUser, service: web::Data<AttendanceService>) -> impl Responder {
    HttpResponse::Ok().json(PeriodListResponse {
        data: service.schedule().periods().to_vec(),
        current: service.current_period().cloned(),
        next: service.next_period().cloned(),
    })
}
