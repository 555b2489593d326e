pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod session;
pub mod state;
pub mod stopwatch;
pub mod storage;
pub mod transport;
pub mod week;

pub use api::StudyApi;
pub use config::ClientConfig;
pub use errors::{ClientError, Result};
pub use models::{Role, Session, SessionPatch};
pub use session::SessionManager;
pub use state::{SessionState, SessionStatus};
pub use storage::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
