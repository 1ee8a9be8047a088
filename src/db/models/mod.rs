mod pool;
mod pool_price_cache;
mod position;
mod position_curve;
mod position_event;
mod position_pnl;
mod token;

pub use pool::Pool;
pub use pool_price_cache::PoolPriceCacheEntry;
pub use position::{ImportType, Position, PositionStatus};
pub use position_curve::{CurvePoint, PositionCurve};
pub use position_event::{EventSource, EventType, PositionEvent};
pub use position_pnl::PositionPnl;
pub use token::Token;
