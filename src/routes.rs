use crate::{
    api::{attendance, audit, company, dashboard, employee, reports, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Routes under the API prefix. Authentication happens in the handlers'
/// `AuthUser` extractor, so these work with or without the middleware.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/clock")
            // /clock
            .service(web::resource("").route(web::get().to(attendance::clock_status)))
            .service(web::resource("/in").route(web::post().to(attendance::clock_in)))
            .service(web::resource("/out").route(web::post().to(attendance::clock_out))),
    )
    .service(
        web::scope("/attendance")
            // /attendance
            .service(
                web::resource("")
                    .route(web::get().to(attendance::list_attendance))
                    .route(web::post().to(attendance::record_attendance)),
            )
            // /attendance/{id}
            .service(
                web::resource("/{id}")
                    .route(web::put().to(attendance::update_attendance))
                    .route(web::delete().to(attendance::delete_attendance)),
            ),
    )
    .service(
        web::scope("/reports")
            .service(web::resource("/daily").route(web::get().to(reports::daily)))
            // must precede /daily/{employee_id}
            .service(web::resource("/daily/blocks").route(web::get().to(reports::daily_blocks)))
            .service(
                web::resource("/daily/{employee_id}").route(web::get().to(reports::daily_detail)),
            )
            .service(web::resource("/monthly").route(web::get().to(reports::monthly)))
            .service(
                web::resource("/monthly/{employee_id}")
                    .route(web::get().to(reports::monthly_detail)),
            )
            .service(
                web::resource("/blocks/{employee_id}")
                    .route(web::get().to(reports::blocks_in_range)),
            ),
    )
    .service(web::resource("/dashboard").route(web::get().to(dashboard::dashboard)))
    .service(
        web::scope("/employees")
            // /employees
            .service(
                web::resource("")
                    .route(web::post().to(employee::create_employee))
                    .route(web::get().to(employee::list_employees)),
            )
            // /employees/{id}
            .service(
                web::resource("/{id}")
                    .route(web::put().to(employee::update_employee))
                    .route(web::get().to(employee::get_employee)),
            )
            .service(
                web::resource("/{id}/toggle").route(web::put().to(employee::toggle_employee)),
            ),
    )
    .service(
        web::scope("/users")
            .service(
                web::resource("")
                    .route(web::get().to(user::list_users))
                    .route(web::post().to(user::create_user)),
            )
            .service(web::resource("/{id}").route(web::put().to(user::update_user)))
            .service(web::resource("/{id}/toggle").route(web::put().to(user::toggle_user))),
    )
    .service(
        web::resource("/company")
            .route(web::get().to(company::get_company))
            .route(web::put().to(company::update_company)),
    )
    .service(web::resource("/audit").route(web::get().to(audit::list_audit)));
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .configure(api_routes),
    );
}

// LOGIN
//  ├─ access_token (ACCESS_TOKEN_TTL)
//  └─ refresh_token (REFRESH_TOKEN_TTL)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, the old refresh token is revoked
