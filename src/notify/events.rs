use serde_json::json;
use uuid::Uuid;

use crate::models::{effective_price, Listing, NotificationKind, LISTING_STATUS_SOLD};

use super::NotificationDraft;

/// Something that happened to a listing that its subscribers hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEvent {
    PriceDrop { old_price: i64, new_price: i64 },
    PriceIncrease { old_price: i64, new_price: i64 },
    Sold,
    Removed { reason: Option<String> },
    Trending,
    StatusChange { from: String, to: String },
    Update { summary: String },
}

impl ListingEvent {
    pub fn kind(&self) -> NotificationKind {
        match self {
            ListingEvent::PriceDrop { .. } => NotificationKind::PriceDrop,
            ListingEvent::PriceIncrease { .. } => NotificationKind::PriceIncrease,
            ListingEvent::Sold => NotificationKind::Sold,
            ListingEvent::Removed { .. } => NotificationKind::Removed,
            ListingEvent::Trending => NotificationKind::Trending,
            ListingEvent::StatusChange { .. } => NotificationKind::StatusChange,
            ListingEvent::Update { .. } => NotificationKind::Update,
        }
    }

    pub fn draft(&self, listing_id: Uuid, listing_name: &str) -> NotificationDraft {
        let (title, message) = match self {
            ListingEvent::PriceDrop {
                old_price,
                new_price,
            } => (
                "Price drop".to_string(),
                format!(
                    "{listing_name} dropped from {} to {}.",
                    format_price(*old_price),
                    format_price(*new_price)
                ),
            ),
            ListingEvent::PriceIncrease {
                old_price,
                new_price,
            } => (
                "Price increase".to_string(),
                format!(
                    "{listing_name} went up from {} to {}.",
                    format_price(*old_price),
                    format_price(*new_price)
                ),
            ),
            ListingEvent::Sold => (
                "Listing sold".to_string(),
                format!("{listing_name} has been sold."),
            ),
            ListingEvent::Removed { .. } => (
                "Listing removed".to_string(),
                format!("{listing_name} is no longer available."),
            ),
            ListingEvent::Trending => (
                "Trending listing".to_string(),
                format!("{listing_name} is getting a lot of attention."),
            ),
            ListingEvent::StatusChange { from, to } => (
                "Status changed".to_string(),
                format!("{listing_name} changed from {from} to {to}."),
            ),
            ListingEvent::Update { summary } => (
                "Listing updated".to_string(),
                format!("{listing_name}: {summary}"),
            ),
        };

        let mut draft = NotificationDraft::new(self.kind(), title, message)
            .listing(listing_id)
            .meta("listing_name", listing_name);

        match self {
            ListingEvent::PriceDrop {
                old_price,
                new_price,
            }
            | ListingEvent::PriceIncrease {
                old_price,
                new_price,
            } => {
                draft = draft
                    .meta("old_price", json!(old_price))
                    .meta("new_price", json!(new_price));
            }
            ListingEvent::StatusChange { from, to } => {
                draft = draft.meta("old_status", from.as_str()).meta("new_status", to.as_str());
            }
            ListingEvent::Removed {
                reason: Some(reason),
            } => {
                draft = draft.meta("reason", reason.as_str());
            }
            _ => {}
        }
        draft
    }
}

/// The pricing fields that decide a listing's effective price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceState {
    pub regular_price: Option<i64>,
    pub discount_price: Option<i64>,
    pub offer: bool,
}

impl PriceState {
    pub fn effective(&self) -> Option<i64> {
        effective_price(self.regular_price, self.discount_price, self.offer)
    }
}

impl From<&Listing> for PriceState {
    fn from(listing: &Listing) -> Self {
        Self {
            regular_price: listing.regular_price,
            discount_price: listing.discount_price,
            offer: listing.offer,
        }
    }
}

/// Compares effective prices; nothing fires unless both sides are known.
pub fn price_change(before: PriceState, after: PriceState) -> Option<ListingEvent> {
    let (old_price, new_price) = (before.effective()?, after.effective()?);
    if new_price < old_price {
        Some(ListingEvent::PriceDrop {
            old_price,
            new_price,
        })
    } else if new_price > old_price {
        Some(ListingEvent::PriceIncrease {
            old_price,
            new_price,
        })
    } else {
        None
    }
}

pub fn status_change(before: &str, after: &str) -> Option<ListingEvent> {
    if before == after {
        return None;
    }
    if after == LISTING_STATUS_SOLD {
        return Some(ListingEvent::Sold);
    }
    Some(ListingEvent::StatusChange {
        from: before.to_string(),
        to: after.to_string(),
    })
}

fn format_price(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if value < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(price: i64) -> PriceState {
        PriceState {
            regular_price: Some(price),
            discount_price: None,
            offer: false,
        }
    }

    #[test]
    fn offer_below_regular_price_is_a_drop() {
        let before = regular(100_000);
        let after = PriceState {
            regular_price: Some(100_000),
            discount_price: Some(90_000),
            offer: true,
        };
        assert_eq!(
            price_change(before, after),
            Some(ListingEvent::PriceDrop {
                old_price: 100_000,
                new_price: 90_000
            })
        );
    }

    #[test]
    fn equal_effective_price_fires_nothing() {
        let before = regular(100_000);
        let after = PriceState {
            regular_price: Some(120_000),
            discount_price: Some(100_000),
            offer: true,
        };
        assert_eq!(price_change(before, after), None);
    }

    #[test]
    fn increase_is_not_a_drop() {
        let event = price_change(regular(100_000), regular(110_000));
        assert!(matches!(event, Some(ListingEvent::PriceIncrease { .. })));
    }

    #[test]
    fn missing_price_on_either_side_fires_nothing() {
        let unknown = PriceState {
            regular_price: None,
            discount_price: None,
            offer: false,
        };
        assert_eq!(price_change(unknown, regular(10)), None);
        let offer_without_discount = PriceState {
            regular_price: Some(100),
            discount_price: None,
            offer: true,
        };
        assert_eq!(price_change(regular(200), offer_without_discount), None);
    }

    #[test]
    fn sold_status_maps_to_sold_event() {
        assert_eq!(status_change("active", "sold"), Some(ListingEvent::Sold));
        assert_eq!(status_change("active", "active"), None);
        assert!(matches!(
            status_change("active", "pending"),
            Some(ListingEvent::StatusChange { .. })
        ));
    }

    #[test]
    fn price_drop_draft_carries_structured_prices() {
        let draft = ListingEvent::PriceDrop {
            old_price: 100_000,
            new_price: 90_000,
        }
        .draft(Uuid::nil(), "Harbor loft");
        assert_eq!(draft.kind, NotificationKind::PriceDrop);
        assert_eq!(draft.message, "Harbor loft dropped from $100,000 to $90,000.");
        assert_eq!(draft.meta["old_price"], 100_000);
        assert_eq!(draft.meta["new_price"], 90_000);
    }

    #[test]
    fn formats_prices_with_grouping() {
        assert_eq!(format_price(0), "$0");
        assert_eq!(format_price(999), "$999");
        assert_eq!(format_price(1_000), "$1,000");
        assert_eq!(format_price(1_234_567), "$1,234,567");
    }
}
