//! Price data access port trait.

use crate::domain::error::CryptofundError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for `asset` in timestamp order, limited to `[start, end]` when given.
    fn fetch_ohlcv(
        &self,
        asset: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<OhlcvBar>, CryptofundError>;

    fn list_assets(&self) -> Result<Vec<String>, CryptofundError>;
}
