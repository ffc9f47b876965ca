pub mod date;
pub mod error;
pub mod logging;

pub use self::date::{DateUtil, TsKey, compare_ts, parse_utc_offset};
pub use self::error::{AppError, AppResult};
