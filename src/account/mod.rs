/// Account directory
///
/// Maps a verified external identity, keyed by (provider, provider subject),
/// to a durable internal account. Every successful login goes through here.

mod directory;

pub use directory::AccountDirectory;

/// Longest accepted provider name
pub const MAX_PROVIDER_LEN: usize = 32;
/// Longest accepted provider subject
pub const MAX_SUBJECT_LEN: usize = 128;
/// Shown to clients when an account has no display name
pub const DEFAULT_DISPLAY_NAME: &str = "Player";
/// Display names are cut to this many characters
pub const MAX_DISPLAY_NAME_LEN: usize = 64;
/// Longest stored email address
pub const MAX_EMAIL_LEN: usize = 128;
