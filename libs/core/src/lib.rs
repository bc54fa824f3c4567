//! Shared types and outbound-call infrastructure for the chat-platform bridge:
//! the inbound/outbound wire types (§3), the retrying HTTP client (C1/C2),
//! the OAuth2 token cache (C4), and the state-file persistence format (C14).

pub mod http;
pub mod state;
pub mod token_cache;
pub mod types;

pub use http::{parse_retry_after, HttpError, RetryingHttpClient};
pub use state::{load as load_state, save as save_state, PersistedState, StateError};
pub use token_cache::TokenCache;
pub use types::{
    now_rfc3339, ConversationRef, InboundEnvelope, OutboundAction, OutboundRequest, Platform, Poll,
};
