// Authentication module
// Token decoding, cookie storage and session refresh coordination

mod types;
pub mod backend;
pub mod codec;
pub mod coordinator;
pub mod store;

pub use backend::AuthBackend;
pub use coordinator::{RefreshCoordinator, RefreshMode};
pub use store::{CookiePolicy, CookieTokenStore, MemoryTokenStore, SameSite, TokenStore};
pub use types::{AuthResponse, SessionState, TokenPair, TokenPayload, User};
