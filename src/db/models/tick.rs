/// Placeholder `price0` for ticks read straight from the chain.
///
/// The tick-to-price formula is not implemented yet, so chain-sourced ticks
/// carry these constants. Ticks from the index API carry real prices.
pub const PLACEHOLDER_PRICE0: f64 = 0.0;
/// Placeholder `price1`, see [`PLACEHOLDER_PRICE0`].
pub const PLACEHOLDER_PRICE1: f64 = 1.0;

/// Initialized tick of a pool (PostgreSQL `tick` table)
///
/// Primary Key: id, formatted as `<pool address>#<tick index>`
/// Upserted every run: prices may change between runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub id: String,
    pub tick_idx: i32,
    pub price0: f64,
    pub price1: f64,
}

impl Tick {
    pub fn new(pool_id: &str, tick_idx: i32, price0: f64, price1: f64) -> Self {
        Self {
            id: tick_id(pool_id, tick_idx),
            tick_idx,
            price0,
            price1,
        }
    }
}

/// Tick ids embed the owning pool, which keeps rows idempotent across runs.
pub fn tick_id(pool_id: &str, tick_idx: i32) -> String {
    format!("{}#{}", pool_id.to_lowercase(), tick_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_id_format() {
        let tick = Tick::new("0x8AD599C3A0FF1DE082011EFDDC58F1908EB6E6D8", -887220, 0.0, 1.0);
        assert_eq!(tick.id, "0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8#-887220");
        assert_eq!(tick.tick_idx, -887220);
    }
}
