// Transfer records exchanged with the wholesaler backend.
// All of these mirror backend JSON and are session-scoped: fetched, held in
// wizard state, replaced wholesale or discarded on reset. Nothing here is
// mutated after deserialization.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Candidate lists returned by the free-text destination search.
/// Both lists come from the same endpoint and are replaced on every search.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DestinationCandidates {
    pub cities: Vec<CityCandidate>,
    pub hotels: Vec<HotelCandidate>,
}

impl DestinationCandidates {
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty() && self.hotels.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CityCandidate {
    pub id: String,
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotelCandidate {
    pub id: String,
    pub name: String,
    pub country: String,
    pub city: String,
}

/// Enriched hotel record fetched once a candidate is chosen.
/// `supplier_ids` and `hotel_code` are the supplier mapping required to
/// query rooms; without them the availability stage cannot run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelDetail {
    pub hotel_code: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub star_rating: Option<u8>,
    #[serde(default)]
    pub facilities: Vec<String>,
    pub supplier_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationPolicy {
    /// ISO date string as issued by the supplier, forwarded for display.
    pub deadline: String,
    pub penalty_amount: f64,
    pub currency: String,
}

/// A priced room offer. The `result_token`, `srk` and `room_token` fields are
/// opaque supplier-issued identifiers and must be forwarded verbatim to the
/// pre-book and confirm stages; they are never parsed or interpreted here.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOffer {
    pub supplier: String,
    pub hotel_code: String,
    pub room_type: String,
    pub room_description: String,
    pub board_type: String,
    pub price: Price,
    pub refundable: bool,
    #[serde(default)]
    pub cancellation_policy: Option<CancellationPolicy>,
    pub result_token: String,
    pub srk: String,
    pub room_token: String,
    pub offer_index: u32,
}

/// Temporary hold on a priced offer. When present, `cancellation_policy` is
/// authoritative and supersedes the room offer's original policy for display.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreBookResult {
    pub availability_token: String,
    #[serde(default)]
    pub cancellation_policy: Option<CancellationPolicy>,
    #[serde(default)]
    pub remarks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Occupancy {
    pub adults: u32,
    pub children: u32,
}

impl Default for Occupancy {
    fn default() -> Self {
        Self {
            adults: 2,
            children: 0,
        }
    }
}

/// Payment methods accepted at the confirm stage. Non-refundable offers are
/// always settled on credit, which the wizard enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PaymentMethod {
    #[serde(rename = "credit")]
    Credit,
    #[serde(rename = "pay-later")]
    PayLater,
}

/// Lead traveler forwarded in the confirm payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traveler {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Traveler {
    /// Stub traveler matching the back office's default confirm payload.
    pub fn placeholder() -> Self {
        Self {
            first_name: "Agency".to_string(),
            last_name: "Guest".to_string(),
            email: "reservations@example.com".to_string(),
        }
    }
}

/// A check-in/check-out pair. Dates cross the wire as `YYYY-MM-DD` strings,
/// which is chrono's default `NaiveDate` serde representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StayDates {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayDates {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// Number of nights, or `None` when the range is empty or inverted.
    pub fn nights(&self) -> Option<i64> {
        let nights = (self.check_out - self.check_in).num_days();
        if nights > 0 {
            Some(nights)
        } else {
            None
        }
    }

    /// Display form of the nights count; an invalid range renders as the
    /// empty string.
    pub fn nights_display(&self) -> String {
        self.nights()
            .map(|n| n.to_string())
            .unwrap_or_default()
    }
}
