use crate::{
    api::{attendance, period},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

/// Token bucket refilling `requests_per_min` per minute, keyed by peer IP.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(GovernorConfig::default);
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(build_limiter(config.rate_protected_per_min)) // rate limiting
            .service(web::resource("/periods").route(web::get().to(period::list_periods)))
            .service(
                web::scope("/attendance")
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(
                        web::resource("/clock-in").route(web::post().to(attendance::clock_in)),
                    )
                    .service(
                        web::resource("/clock-out").route(web::post().to(attendance::clock_out)),
                    )
                    .service(web::resource("/verify").route(web::post().to(attendance::verify)))
                    .service(web::resource("/face").route(web::put().to(attendance::enroll_face)))
                    .service(
                        web::resource("/history").route(web::get().to(attendance::history)),
                    )
                    // admin only
                    .service(web::resource("/all").route(web::get().to(attendance::all_records))),
            ),
    );
}
