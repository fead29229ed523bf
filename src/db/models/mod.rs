mod pool;
mod tick;
mod token;

pub use pool::{Pool, PoolTick};
pub use tick::{tick_id, Tick, PLACEHOLDER_PRICE0, PLACEHOLDER_PRICE1};
pub use token::Token;
