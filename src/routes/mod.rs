mod auth;
mod health_check;

pub use auth::{
    forgot_password, get_current_user, login, logout, refresh_token, register,
    resend_verification, reset_password, validate_token, verify_email,
};
pub use health_check::health_check;
