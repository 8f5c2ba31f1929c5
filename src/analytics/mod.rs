//! Pure calculations over in-memory trade lists. Nothing here touches the
//! database or the network.

pub mod dashboard;
pub mod risk;

pub use dashboard::{compute_dashboard, equity_curve, DashboardStats, DateRange, EquityCurvePoint, PROFIT_FACTOR_CAP};
pub use risk::{evaluate, position_size};
