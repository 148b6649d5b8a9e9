pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod models;
pub mod normalize;
pub mod session;

pub use error::SessionError;
pub use models::{CashInfo, EquityPoint, Overview, Position, Snapshot};
pub use session::PortfolioSession;
