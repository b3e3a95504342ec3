use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::middleware::JwtMiddleware;
use crate::routes::{
    forgot_password, get_current_user, health_check, login, logout, refresh_token, register,
    resend_verification, reset_password, validate_token, verify_email,
};
use crate::service::AuthService;

pub fn run(listener: TcpListener, auth: Arc<AuthService>) -> Result<Server, std::io::Error> {
    let auth_data = web::Data::from(auth.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(auth_data.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1/auth")
                    // Public routes (no authentication required)
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh-token", web::post().to(refresh_token))
                    .route("/logout", web::post().to(logout))
                    .route("/validate-token", web::post().to(validate_token))
                    .route("/forgot-password", web::post().to(forgot_password))
                    .route("/reset-password", web::post().to(reset_password))
                    .route("/verify-email", web::post().to(verify_email))
                    .route("/resend-verification", web::post().to(resend_verification))
                    // Protected routes (require a valid access token)
                    .service(
                        web::scope("")
                            .wrap(JwtMiddleware::new(auth.clone()))
                            .route("/me", web::get().to(get_current_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
