pub mod cipher;
pub mod handshake;
pub mod identity;
pub mod replay;
pub mod session_store;

pub use cipher::{Direction, SessionKey};
pub use handshake::HandshakeController;
pub use identity::{seal_for, NodeIdentity};
pub use replay::NonceCache;
pub use session_store::{Clock, ManualClock, PutOutcome, Session, SessionStore, SystemClock};
