/// Authentication primitives
///
/// JWT claims, signature verification with caching, token issuance,
/// and password hashing.

mod claims;
mod codec;
mod issuer;
mod password;

pub use claims::Claims;
pub use claims::TokenType;
pub use codec::CachedClaimsCodec;
pub use codec::ClaimsCodec;
pub use codec::VerifyError;
pub use issuer::TokenIssuer;
pub use password::hash_password;
pub use password::verify_password;
