use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::{App, test, web::Data};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use attendance::attendance::AttendanceService;
use attendance::attendance::clock::Clock;
use attendance::attendance::face::{FaceSample, HistogramComparer};
use attendance::attendance::location::FallbackMode;
use attendance::attendance::schedule::PeriodSchedule;
use attendance::auth::jwt::generate_access_token;
use attendance::config::Config;
use attendance::model::geo::GeoPoint;
use attendance::routes;
use attendance::store::MemoryStore;

const SECRET: &str = "integration-secret";
const LAT: f64 = 23.8103;
const LNG: f64 = 90.4125;

const PERIODS: &str = r#"[
    {"id": 1, "name": "Period 1", "start": "08:00", "end": "08:50",
     "location": {"latitude": 23.8103, "longitude": 90.4125},
     "location_name": "Main Building", "radius_m": 100.0},
    {"id": 2, "name": "Period 2", "start": "09:00", "end": "09:50",
     "location": {"latitude": 23.8103, "longitude": 90.4125},
     "location_name": "Main Building", "radius_m": 100.0}
]"#;

struct TestClock(Mutex<NaiveDateTime>);

impl TestClock {
    fn at(h: u32, m: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(today().and_time(time(h, m)))))
    }

    fn set(&self, h: u32, m: u32) {
        *self.0.lock().unwrap() = today().and_time(time(h, m));
    }
}

impl Clock for TestClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, 5).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn config() -> Config {
    Config {
        server_addr: "127.0.0.1:0".into(),
        database_url: None,
        jwt_secret: SECRET.into(),
        api_prefix: "/api".into(),
        rate_protected_per_min: 10_000,
        periods_file: None,
        seed_demo_data: true,
        location_timeout: Duration::from_secs(1),
        location_fallback: FallbackMode::Default,
        default_location: GeoPoint::new(LAT, LNG).unwrap(),
        session_idle: Duration::from_secs(60),
        log_dir: "logs".into(),
    }
}

fn service(clock: Arc<TestClock>) -> Data<AttendanceService> {
    let config = config();
    Data::new(
        AttendanceService::new(
            Arc::new(MemoryStore::with_demo_data(today())),
            Arc::new(PeriodSchedule::from_json(PERIODS).unwrap()),
            Arc::new(HistogramComparer),
            config.location_settings(),
        )
        .with_clock(clock),
    )
}

fn employee_token() -> String {
    generate_access_token(2, "John Employee".into(), 2, SECRET, 900).unwrap()
}

fn admin_token() -> String {
    generate_access_token(1, "Alice Admin".into(), 1, SECRET, 900).unwrap()
}

fn get(uri: &str, token: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .peer_addr("127.0.0.1:40000".parse().unwrap())
        .insert_header(("Authorization", format!("Bearer {token}")))
}

fn post(uri: &str, token: &str, body: Value) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .peer_addr("127.0.0.1:40000".parse().unwrap())
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(body)
}

fn put(uri: &str, token: &str, body: Value) -> test::TestRequest {
    test::TestRequest::put()
        .uri(uri)
        .peer_addr("127.0.0.1:40000".parse().unwrap())
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(body)
}

macro_rules! app {
    ($service:expr) => {{
        let config = config();
        test::init_service(
            App::new()
                .app_data($service.clone())
                .app_data(Data::new(config.clone()))
                .configure(|cfg| routes::configure(cfg, &config)),
        )
        .await
    }};
}

#[actix_web::test]
async fn requests_without_token_are_rejected() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);

    let req = test::TestRequest::get()
        .uri("/api/attendance/today")
        .peer_addr("127.0.0.1:40000".parse().unwrap())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = test::call_service(&app, get("/api/attendance/today", "not-a-jwt").to_request()).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_web::test]
async fn period_mark_inside_window_and_radius() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);
    let token = employee_token();

    let body = json!({"period_id": 1, "latitude": LAT, "longitude": LNG});
    let resp = test::call_service(&app, post("/api/attendance/clock-in", &token, body.clone()).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let record: Value = test::read_body_json(resp).await;
    assert_eq!(record["period_marks"][0]["period_id"], json!(1));
    assert_eq!(record["period_marks"][0]["marked_at"], json!("08:10"));
    assert_eq!(record["status"], json!("present"));

    let resp = test::call_service(&app, post("/api/attendance/clock-in", &token, body).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("already_marked"));
}

#[actix_web::test]
async fn period_mark_outside_window_is_declined() {
    let service = service(TestClock::at(9, 55));
    let app = app!(service);

    let body = json!({"period_id": 2, "latitude": LAT, "longitude": LNG});
    let resp = test::call_service(&app, post("/api/attendance/clock-in", &employee_token(), body).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("outside_period_window"));
    assert!(err["message"].as_str().is_some());
}

#[actix_web::test]
async fn period_mark_far_from_location_is_declined() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);
    let token = employee_token();

    // roughly 500 m north
    let body = json!({"period_id": 1, "latitude": LAT + 0.0045, "longitude": LNG});
    let resp = test::call_service(&app, post("/api/attendance/clock-in", &token, body).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("location_mismatch"));

    let resp = test::call_service(&app, get("/api/attendance/today", &token).to_request()).await;
    let today: Value = test::read_body_json(resp).await;
    assert_eq!(today["record"]["period_marks"], json!([]));
}

#[actix_web::test]
async fn unknown_period_is_declined() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);

    let body = json!({"period_id": 42, "latitude": LAT, "longitude": LNG});
    let resp = test::call_service(&app, post("/api/attendance/clock-in", &employee_token(), body).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("period_not_found"));
}

#[actix_web::test]
async fn clock_out_without_clock_in_is_declined() {
    let service = service(TestClock::at(17, 0));
    let app = app!(service);

    let resp = test::call_service(&app, post("/api/attendance/clock-out", &employee_token(), json!({})).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("no_active_session"));
}

#[actix_web::test]
async fn full_day_computes_hours_and_status() {
    let clock = TestClock::at(8, 0);
    let service = service(clock.clone());
    let app = app!(service);
    let token = employee_token();

    let resp = test::call_service(&app, post("/api/attendance/clock-in", &token, json!({})).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = test::call_service(&app, get("/api/attendance/today", &token).to_request()).await;
    let today: Value = test::read_body_json(resp).await;
    assert_eq!(today["is_clocked_in"], json!(true));
    assert_eq!(today["phase"], json!("in_progress"));
    assert_eq!(today["current_period"]["id"], json!(1));

    clock.set(12, 30);
    let resp = test::call_service(&app, post("/api/attendance/clock-out", &token, json!({})).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let record: Value = test::read_body_json(resp).await;
    assert_eq!(record["clock_in_time"], json!("08:00"));
    assert_eq!(record["clock_out_time"], json!("12:30"));
    assert_eq!(record["total_hours"], json!(4.5));
    assert_eq!(record["status"], json!("present"));

    let resp = test::call_service(&app, post("/api/attendance/clock-out", &token, json!({})).to_request()).await;
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("already_clocked_out"));
}

#[actix_web::test]
async fn short_day_is_half_day() {
    let clock = TestClock::at(9, 0);
    let service = service(clock.clone());
    let app = app!(service);
    let token = employee_token();

    test::call_service(&app, post("/api/attendance/clock-in", &token, json!({})).to_request()).await;
    clock.set(11, 30);
    let resp = test::call_service(&app, post("/api/attendance/clock-out", &token, json!({})).to_request()).await;
    let record: Value = test::read_body_json(resp).await;
    assert_eq!(record["total_hours"], json!(2.5));
    assert_eq!(record["status"], json!("half-day"));
}

#[actix_web::test]
async fn verified_mark_requires_matching_face() {
    let service = service(TestClock::at(8, 20));
    let app = app!(service);
    let token = employee_token();

    let reference = FaceSample::new((0..128u8).collect()).to_base64();
    let stranger = FaceSample::new(vec![7u8; 128]).to_base64();

    let body = json!({"period_id": 1, "latitude": LAT, "longitude": LNG, "face_image": reference});
    let resp = test::call_service(&app, post("/api/attendance/verify", &token, body.clone()).to_request()).await;
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("face_not_enrolled"));

    let resp = test::call_service(
        &app,
        put("/api/attendance/face", &token, json!({"face_image": format!("data:image/jpeg;base64,{reference}")}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);

    let wrong = json!({"period_id": 1, "latitude": LAT, "longitude": LNG, "face_image": stranger});
    let resp = test::call_service(&app, post("/api/attendance/verify", &token, wrong).to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["reason"], json!("face_not_matched"));

    let resp = test::call_service(&app, post("/api/attendance/verify", &token, body).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let record: Value = test::read_body_json(resp).await;
    assert_eq!(record["period_marks"][0]["period_id"], json!(1));
}

#[actix_web::test]
async fn verification_without_frame_reports_camera_unavailable() {
    let service = service(TestClock::at(8, 20));
    let app = app!(service);
    let token = employee_token();

    let frame = FaceSample::new((0..128u8).collect()).to_base64();
    test::call_service(&app, put("/api/attendance/face", &token, json!({"face_image": frame})).to_request()).await;

    let resp = test::call_service(&app, post("/api/attendance/verify", &token, json!({"period_id": 1})).to_request()).await;
    assert_eq!(resp.status().as_u16(), 503);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["retryable"], json!(true));
}

#[actix_web::test]
async fn history_excludes_today_and_summarizes() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);
    let token = employee_token();

    test::call_service(&app, post("/api/attendance/clock-in", &token, json!({})).to_request()).await;

    let resp = test::call_service(&app, get("/api/attendance/history", &token).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let history: Value = test::read_body_json(resp).await;
    let data = history["data"].as_array().unwrap();
    assert!(!data.is_empty());
    assert!(data.iter().all(|r| r["date"] != json!("2025-05-05")));
    assert!(data.iter().all(|r| r["user_id"] == json!(2)));
    assert_eq!(history["summary"]["total"], json!(data.len()));

    let dates: Vec<&str> = data.iter().map(|r| r["date"].as_str().unwrap()).collect();
    let mut sorted = dates.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(dates, sorted);
}

#[actix_web::test]
async fn organization_listing_is_admin_only() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);

    let resp = test::call_service(&app, get("/api/attendance/all", &employee_token()).to_request()).await;
    assert_eq!(resp.status().as_u16(), 403);

    let resp = test::call_service(&app, get("/api/attendance/all", &admin_token()).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let all: Value = test::read_body_json(resp).await;
    let users: std::collections::BTreeSet<u64> = all["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["user_id"].as_u64().unwrap())
        .collect();
    assert!(users.len() > 1);
}

#[actix_web::test]
async fn periods_report_current_and_next() {
    let service = service(TestClock::at(8, 10));
    let app = app!(service);

    let resp = test::call_service(&app, get("/api/periods", &employee_token()).to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);
    let periods: Value = test::read_body_json(resp).await;
    assert_eq!(periods["data"].as_array().unwrap().len(), 2);
    assert_eq!(periods["current"]["id"], json!(1));
    assert_eq!(periods["next"]["id"], json!(2));
}
