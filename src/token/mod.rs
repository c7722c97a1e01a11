/// Credential issuance
///
/// - [`AccessTokenIssuer`]: short-lived HS256 JWTs that downstream services
///   verify on their own.
/// - [`RefreshLedger`]: long-lived opaque secrets, stored hashed, redeemable
///   exactly once.

mod access;
mod refresh;

pub use access::{AccessClaims, AccessToken, AccessTokenIssuer};
pub use refresh::{hash_secret, MintedToken, Redemption, RefreshLedger};
