//! Source schemas and the payload assembler.
//!
//! Each source table is described once by a [`SourceSchema`]: its store
//! columns and a mapping table from raw column to canonical field. Adding a
//! feed means adding a schema here, not another copy of the cleaners.

pub mod validator;

use crate::models::{CanonicalPayload, ListingType, RawRow, RawValue, SourceKind};
use crate::normalizer::{self as norm, NormalizeContext};

// ── Canonical fields ──────────────────────────────────────────────────────────

/// A canonical payload field together with the normalizer that fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PropertyName,
    ListingUrl,
    Area,
    State,
    Price,
    Size,
    BuiltUpPrice,
    Bedrooms,
    Bathrooms,
    Carparks,
    Latitude,
    Longitude,
    /// Map link or page markup; fills whichever coordinate is still missing.
    MapLink,
    Tenure,
    PropertyType,
    ListingDate,
    AuctionDate,
}

impl Field {
    fn apply(self, raw: &RawValue, p: &mut CanonicalPayload, ctx: &NormalizeContext) {
        match self {
            Field::PropertyName => p.property_name = norm::clean_text(raw),
            Field::ListingUrl => p.listing_url = norm::clean_text(raw),
            Field::Area => p.area = norm::clean_text(raw),
            Field::State => p.state = norm::clean_state(raw),
            Field::Price => p.price = norm::to_price(raw),
            Field::Size => p.size = norm::parse_area_sqft(raw),
            Field::BuiltUpPrice => p.built_up_price = norm::parse_price_per_sqft(raw),
            Field::Bedrooms => {
                p.no_of_bedroom = norm::bound_bedrooms(norm::parse_bedrooms(raw), ctx.bedroom_clamp)
            }
            Field::Bathrooms => p.no_of_bathroom = norm::to_f64(raw),
            Field::Carparks => p.no_of_carpark = norm::to_f64(raw),
            Field::Latitude => p.latitude = norm::to_f64(raw),
            Field::Longitude => p.longitude = norm::to_f64(raw),
            Field::MapLink => {
                if p.latitude.is_some() && p.longitude.is_some() {
                    return;
                }
                if let Some(text) = raw.as_text() {
                    let (lat, lng) = norm::extract_coordinates(&text);
                    if lat.is_some() && lng.is_some() {
                        p.latitude = lat;
                        p.longitude = lng;
                    }
                }
            }
            Field::Tenure => p.property_tenure = norm::clean_tenure(raw),
            Field::PropertyType => p.property_type = norm::clean_property_type(raw),
            Field::ListingDate => p.listing_date = Some(norm::listing_date(raw, ctx.today)),
            Field::AuctionDate => p.auction_date = norm::auction_date(raw),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub raw_key: &'static str,
    pub field: Field,
}

const fn map(raw_key: &'static str, field: Field) -> FieldMapping {
    FieldMapping { raw_key, field }
}

// ── Source schemas ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SourceSchema {
    /// Store table name.
    pub table: &'static str,
    /// Spreadsheet tab mirrored from this table.
    pub sheet: &'static str,
    /// Short label used in log lines.
    pub label: &'static str,
    pub kind: SourceKind,
    pub listing_type: ListingType,
    /// Store columns in table order, `list_id` first.
    pub columns: &'static [&'static str],
    pub mappings: &'static [FieldMapping],
}

const NEW_LISTING_COLUMNS: &[&str] = &[
    "list_id",
    "name",
    "url",
    "area",
    "state",
    "price",
    "bed_rooms",
    "built_up_size",
    "built_up_price",
    "posted_date",
    "tenure",
    "furnished_status",
    "property_type",
    "property_title_type",
    "lat",
    "lng",
    "map_link",
    "description",
    "new_project",
    "auction",
    "below_market_value",
    "urgent",
    "agent_name",
    "agency_name",
    "website_name",
    "data_scraping_date",
];

const AUCTION_LISTING_COLUMNS: &[&str] = &[
    "list_id",
    "name",
    "url",
    "area",
    "state",
    "price",
    "bed_rooms",
    "bath_rooms",
    "parking",
    "built_up_size",
    "posted_date",
    "auction_date",
    "tenure",
    "furnished_status",
    "property_type",
    "lat",
    "lng",
    "map_link",
    "description",
    "new_project",
    "auction",
    "below_market_value",
    "urgent",
    "website_name",
    "data_scraping_date",
];

const NEW_LISTING_MAPPINGS: &[FieldMapping] = &[
    map("name", Field::PropertyName),
    map("url", Field::ListingUrl),
    map("area", Field::Area),
    map("state", Field::State),
    map("price", Field::Price),
    map("bed_rooms", Field::Bedrooms),
    map("built_up_size", Field::Size),
    map("built_up_price", Field::BuiltUpPrice),
    map("posted_date", Field::ListingDate),
    map("tenure", Field::Tenure),
    map("property_type", Field::PropertyType),
    map("lat", Field::Latitude),
    map("lng", Field::Longitude),
    map("map_link", Field::MapLink),
];

const AUCTION_LISTING_MAPPINGS: &[FieldMapping] = &[
    map("name", Field::PropertyName),
    map("url", Field::ListingUrl),
    map("area", Field::Area),
    map("state", Field::State),
    map("price", Field::Price),
    map("bed_rooms", Field::Bedrooms),
    map("bath_rooms", Field::Bathrooms),
    map("parking", Field::Carparks),
    map("built_up_size", Field::Size),
    map("posted_date", Field::ListingDate),
    map("auction_date", Field::AuctionDate),
    map("tenure", Field::Tenure),
    map("property_type", Field::PropertyType),
    map("lat", Field::Latitude),
    map("lng", Field::Longitude),
    map("map_link", Field::MapLink),
];

pub static SOURCES: [SourceSchema; 3] = [
    SourceSchema {
        table: "iproperty_new_listing",
        sheet: "iproperty-new-listing",
        label: "iproperty",
        kind: SourceKind::NewListing,
        listing_type: ListingType::Subsale,
        columns: NEW_LISTING_COLUMNS,
        mappings: NEW_LISTING_MAPPINGS,
    },
    SourceSchema {
        table: "property_guru_new_listing",
        sheet: "property-guru-new-listing",
        label: "prop-guru",
        kind: SourceKind::NewListing,
        listing_type: ListingType::Subsale,
        columns: NEW_LISTING_COLUMNS,
        mappings: NEW_LISTING_MAPPINGS,
    },
    SourceSchema {
        table: "iproperty_auction_listing",
        sheet: "iproperty-auction-listing",
        label: "iproperty-auction",
        kind: SourceKind::AuctionListing,
        listing_type: ListingType::Auction,
        columns: AUCTION_LISTING_COLUMNS,
        mappings: AUCTION_LISTING_MAPPINGS,
    },
];

/// Look up a schema by table name, sheet name or label.
pub fn schema_for(name: &str) -> Option<&'static SourceSchema> {
    let name = name.trim();
    SOURCES
        .iter()
        .find(|s| s.table == name || s.sheet == name || s.label == name)
}

/// Schemas selected by an optional table filter; all of them when `None`.
pub fn select_sources(filter: Option<&str>) -> anyhow::Result<Vec<&'static SourceSchema>> {
    match filter {
        None => Ok(SOURCES.iter().collect()),
        Some(name) => schema_for(name)
            .map(|s| vec![s])
            .ok_or_else(|| anyhow::anyhow!("Unknown source table '{}'", name)),
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────────

/// Build the canonical payload for one raw row.
///
/// Pure: the same row, schema and context always give the same payload.
pub fn assemble(schema: &SourceSchema, row: &RawRow, ctx: &NormalizeContext) -> CanonicalPayload {
    let mut payload = CanonicalPayload::empty(schema.listing_type);
    for m in schema.mappings {
        m.field.apply(row.get(m.raw_key), &mut payload, ctx);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::validator::validate;
    use super::*;
    use crate::models::{PropertyType, Tenure};
    use chrono::NaiveDate;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(), false)
    }

    fn e2e_row() -> RawRow {
        [
            ("list_id", "123456"),
            ("name", "Residensi Sentral"),
            ("url", "https://x/y/123456"),
            ("area", "Setapak"),
            ("state", "Kuala Lumpur"),
            ("price", ""),
            ("bed_rooms", "3+1"),
            ("built_up_size", "1,098 sq. ft."),
            ("tenure", "Tenure: Freehold "),
            ("property_type", "Condominium for sale"),
            ("lat", "3.1"),
            ("lng", "101.6"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_end_to_end_row() {
        let schema = schema_for("iproperty_new_listing").unwrap();
        let p = assemble(schema, &e2e_row(), &ctx());

        assert_eq!(p.price, 0.0);
        assert_eq!(p.no_of_bedroom, Some(4));
        assert_eq!(p.property_tenure, Some(Tenure::Freehold));
        assert_eq!(p.latitude, Some(3.1));
        assert_eq!(p.longitude, Some(101.6));
        assert_eq!(p.size, Some(1098.0));
        assert_eq!(p.property_type, PropertyType::Condo);
        assert_eq!(p.listing_type, ListingType::Subsale);
        assert_eq!(p.listing_date.as_deref(), Some("2025-10-19"));
        assert!(validate(&p).is_sendable());
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let schema = schema_for("prop-guru").unwrap();
        let row = e2e_row();
        assert_eq!(assemble(schema, &row, &ctx()), assemble(schema, &row, &ctx()));
    }

    #[test]
    fn test_auction_schema_fields() {
        let schema = schema_for("iproperty-auction-listing").unwrap();
        let row: RawRow = [
            ("list_id", "sale-100200300"),
            ("url", "https://www.iproperty.com.my/property/x/sale-100200300/"),
            ("auction_date", "Auction on 01/11/2025"),
            ("bath_rooms", "2"),
            ("parking", "1 car park"),
            ("bed_rooms", "9"),
            ("map_link", "https://www.google.com/maps?q=3.05,101.55"),
        ]
        .into_iter()
        .collect();
        let p = assemble(schema, &row, &ctx());

        assert_eq!(p.listing_type, ListingType::Auction);
        assert_eq!(p.auction_date.as_deref(), Some("2025-11-01"));
        assert_eq!(p.no_of_bathroom, Some(2.0));
        assert_eq!(p.no_of_carpark, Some(1.0));
        assert_eq!(p.no_of_bedroom, None);
        assert_eq!((p.latitude, p.longitude), (Some(3.05), Some(101.55)));

        let clamped = assemble(schema, &row, &NormalizeContext { bedroom_clamp: true, ..ctx() });
        assert_eq!(clamped.no_of_bedroom, Some(5));
    }

    #[test]
    fn test_select_sources() {
        assert_eq!(select_sources(None).unwrap().len(), 3);
        assert_eq!(select_sources(Some("iproperty")).unwrap()[0].table, "iproperty_new_listing");
        assert!(select_sources(Some("nope")).is_err());
    }
}
