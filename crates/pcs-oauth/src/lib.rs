//! OAuth2 plumbing shared by every OAuth2-based provider adapter: per-provider
//! endpoint configuration, a [`SessionManager`](pcs_core::session::SessionManager)
//! that attaches and refreshes bearer tokens, and the bootstrap flow that turns
//! an app registration plus a user's authorization into saved credentials.

pub mod bootstrap;
pub mod params;
pub mod session;

pub use bootstrap::{authorize_url, exchange_code, open_in_browser, CallbackParams, LocalCallbackServer, PendingAuthorization};
pub use params::OAuth2ProviderParameters;
pub use session::OAuth2SessionManager;
