use crate::models::DescriptionFlags;

const NEW_PROJECT: &[&str] = &[
    "new launch",
    "rebate",
    "direct developer",
    "early bird",
    "sale package",
    "new project",
    "free spa legal",
    "free legal",
    "free loan legal",
];
const AUCTION: &[&str] = &["auction", "lelong", "reserve price", "bid", "bidding", "bidder", "bids"];
const BELOW_MARKET: &[&str] = &["below market", "discount", "bargain", "fire sale"];
const URGENT: &[&str] = &["urgent", "must sell", "quick sale"];

/// Keyword scan of a listing description. Flags are independent of each other.
pub fn analyze_description(description: Option<&str>) -> DescriptionFlags {
    let text = description.unwrap_or_default().to_lowercase();
    let any = |keys: &[&str]| keys.iter().any(|k| text.contains(k));

    DescriptionFlags {
        new_project: any(NEW_PROJECT),
        auction: any(AUCTION),
        below_market_value: any(BELOW_MARKET),
        urgent: any(URGENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent() {
        let f = analyze_description(Some("URGENT! Must sell, below market value. Lelong unit."));
        assert!(f.urgent);
        assert!(f.below_market_value);
        assert!(f.auction);
        assert!(!f.new_project);
    }

    #[test]
    fn test_no_description() {
        assert_eq!(analyze_description(None), DescriptionFlags::default());
        assert_eq!(analyze_description(Some("Cosy unit near LRT")), DescriptionFlags::default());
        assert!(analyze_description(Some("New launch with early bird rebate")).new_project);
    }
}
