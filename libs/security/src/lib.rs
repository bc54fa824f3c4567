pub mod slack_hmac;
pub mod teams_jwt;

pub use slack_hmac::{verify_slack_signature, SlackSignatureError};
pub use teams_jwt::{TeamsClaims, TeamsJwtError, TeamsJwtVerifier};
