//! Field normalizers: one raw value in, one canonical value out.
//!
//! Every function here is total. Input that cannot be interpreted maps to a
//! documented fallback (`None`, a sentinel, `0.0`, `condo`, or the run date)
//! instead of an error, so a single odd cell never stops a record.

pub mod dates;
pub mod flags;
pub mod geo;
pub mod numeric;
pub mod text;

use chrono::NaiveDate;

pub use self::dates::{auction_date, listing_date};
pub use self::flags::analyze_description;
pub use self::geo::extract_coordinates;
pub use self::numeric::{
    bound_bedrooms, parse_area_sqft, parse_bedrooms, parse_price_per_sqft, to_f64, to_price,
};
pub use self::text::{clean_property_type, clean_state, clean_tenure, clean_text, extract_list_id};

/// Inputs that make normalization reproducible: the run date used as the
/// listing-date fallback and the bedroom clamp mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeContext {
    pub today: NaiveDate,
    pub bedroom_clamp: bool,
}

impl NormalizeContext {
    pub fn new(today: NaiveDate, bedroom_clamp: bool) -> Self {
        Self { today, bedroom_clamp }
    }
}
