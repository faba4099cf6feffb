// REST client for the wholesaler backend.
// The five endpoints consumed by the manual-reservation flow live behind the
// `BackendApi` trait so the wizard can be driven against a mock in tests.
// Contract is JSON in, JSON out; no retries, no idempotency keys, no backoff.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::records::{
    BookingConfirmation, CancellationPolicy, DestinationCandidates, HotelDetail, Occupancy,
    PaymentMethod, PreBookResult, Price, RoomOffer, StayDates, Traveler,
};
use crate::session::SessionContext;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// HTTP 2xx carrying `success: false`; surfaced the same way as a
    /// transport failure, matching the back office's error policy.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("client setup error: {0}")]
    Init(String),
}

/// Client configuration shared by the backend client and the wizard.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Trailing debounce window for the destination search.
    pub debounce_ms: u64,
    pub default_occupancy: Occupancy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 10_000,
            debounce_ms: 500,
            default_occupancy: Occupancy::default(),
        }
    }
}

// Request payloads. Field names follow the backend contract, hence the
// camelCase renames; supplier tokens are echoed verbatim.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSearchRequest {
    pub supplier_id: Vec<String>,
    pub agency_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub occupancy: Occupancy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreBookRequest {
    pub supplier: String,
    pub hotel_code: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub result_token: String,
    pub srk: String,
    pub offer_index: u32,
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub provider: String,
    pub stay_details: StayDates,
    pub srk: String,
    pub result_token: String,
    pub availability_token: String,
    pub payment: PaymentMethod,
    pub reference: String,
    pub rooms: Vec<String>,
    pub booking_type: String,
    pub data: ConfirmData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmData {
    pub traveler: Traveler,
    pub markup_percent: f64,
}

// The room-search endpoint answers with a tree grouped by hotel and board;
// the wizard wants a flat offer list, so the tree is flattened on arrival
// and the grouping is not kept.

#[derive(Debug, Deserialize)]
pub struct RoomSearchResponse {
    pub hotels: Vec<HotelRooms>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelRooms {
    pub supplier: String,
    pub hotel_code: String,
    pub result_token: String,
    pub srk: String,
    pub boards: Vec<BoardRooms>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRooms {
    pub board_type: String,
    pub rooms: Vec<RoomEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntry {
    pub room_type: String,
    pub description: String,
    pub price: Price,
    pub non_refundable: bool,
    #[serde(default)]
    pub cancellation_policy: Option<CancellationPolicy>,
    pub room_token: String,
}

impl RoomSearchResponse {
    /// Flatten the per-hotel, per-board tree into the offer list the wizard
    /// renders. Offer indices count options within one hotel entry, which is
    /// what the pre-book endpoint expects back.
    pub fn into_offers(self) -> Vec<RoomOffer> {
        let mut offers = Vec::new();
        for hotel in self.hotels {
            let mut offer_index = 0u32;
            for board in hotel.boards {
                for room in board.rooms {
                    offers.push(RoomOffer {
                        supplier: hotel.supplier.clone(),
                        hotel_code: hotel.hotel_code.clone(),
                        room_type: room.room_type,
                        room_description: room.description,
                        board_type: board.board_type.clone(),
                        price: room.price,
                        refundable: !room.non_refundable,
                        cancellation_policy: room.cancellation_policy,
                        result_token: hotel.result_token.clone(),
                        srk: hotel.srk.clone(),
                        room_token: room.room_token,
                        offer_index,
                    });
                    offer_index += 1;
                }
            }
        }
        offers
    }
}

/// The backend seam the reservation wizard drives.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    /// Free-text destination search; one call returns both candidate lists.
    async fn search_destinations(
        &self,
        term: &str,
    ) -> Result<DestinationCandidates, BackendError>;

    /// Canonical hotel lookup, filtered by city and optionally hotel name.
    async fn search_hotels(
        &self,
        city: &str,
        hotel_name: Option<&str>,
    ) -> Result<Vec<HotelDetail>, BackendError>;

    async fn fetch_rooms(
        &self,
        request: RoomSearchRequest,
    ) -> Result<Vec<RoomOffer>, BackendError>;

    async fn pre_book(&self, request: PreBookRequest) -> Result<PreBookResult, BackendError>;

    async fn confirm_booking(
        &self,
        request: ConfirmRequest,
    ) -> Result<BookingConfirmation, BackendError>;
}

/// reqwest-backed implementation. The bearer token comes from the session
/// context on every call, booking endpoints included.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig, session: SessionContext) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::Init(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "backend GET");
        let request = self.authorize(self.http.get(&url).query(query));
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "backend POST");
        let request = self.authorize(self.http.post(&url).json(body));
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        if !status.is_success() {
            let message = backend_message(&value);
            tracing::warn!(status = status.as_u16(), %message, "backend call failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        // Business-rule rejections come back 2xx with success:false.
        if value.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = backend_message(&value);
            tracing::warn!(%message, "backend rejected request");
            return Err(BackendError::Rejected(message));
        }

        serde_json::from_value(value).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

fn backend_message(value: &serde_json::Value) -> String {
    value
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("no message")
        .to_string()
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn search_destinations(
        &self,
        term: &str,
    ) -> Result<DestinationCandidates, BackendError> {
        self.get_json("/irix/localdb", &[("searchTerm", term)]).await
    }

    async fn search_hotels(
        &self,
        city: &str,
        hotel_name: Option<&str>,
    ) -> Result<Vec<HotelDetail>, BackendError> {
        let mut query = vec![("city", city)];
        if let Some(name) = hotel_name {
            query.push(("hotelName", name));
        }
        self.get_json("/manual-reservation/search", &query).await
    }

    async fn fetch_rooms(
        &self,
        request: RoomSearchRequest,
    ) -> Result<Vec<RoomOffer>, BackendError> {
        let response: RoomSearchResponse = self.post_json("/hotel/rooms", &request).await?;
        Ok(response.into_offers())
    }

    async fn pre_book(&self, request: PreBookRequest) -> Result<PreBookResult, BackendError> {
        self.post_json("/pre-book", &request).await
    }

    async fn confirm_booking(
        &self,
        request: ConfirmRequest,
    ) -> Result<BookingConfirmation, BackendError> {
        self.post_json("/book-confirm", &request).await
    }
}

// Scripted backend for tests: deterministic responses, failure injection and
// per-endpoint call counts.
#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    pub struct CallCounts {
        pub destination_searches: AtomicUsize,
        pub hotel_searches: AtomicUsize,
        pub room_fetches: AtomicUsize,
        pub pre_books: AtomicUsize,
        pub confirms: AtomicUsize,
    }

    #[derive(Default)]
    pub struct MockBackend {
        destinations: Mutex<HashMap<String, DestinationCandidates>>,
        hotels: Mutex<Vec<HotelDetail>>,
        rooms: Mutex<Vec<RoomOffer>>,
        pre_book_result: Mutex<Option<PreBookResult>>,
        confirmation: Mutex<Option<BookingConfirmation>>,
        fail_next: AtomicUsize,
        reject_next: AtomicUsize,
        delay_ms: AtomicUsize,
        pub calls: CallCounts,
        pub last_pre_book: Mutex<Option<PreBookRequest>>,
        pub last_confirm: Mutex<Option<ConfirmRequest>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_destinations(&self, term: &str, candidates: DestinationCandidates) {
            self.destinations
                .lock()
                .insert(term.to_string(), candidates);
        }

        pub fn set_hotels(&self, hotels: Vec<HotelDetail>) {
            *self.hotels.lock() = hotels;
        }

        pub fn set_rooms(&self, rooms: Vec<RoomOffer>) {
            *self.rooms.lock() = rooms;
        }

        pub fn set_pre_book_result(&self, result: PreBookResult) {
            *self.pre_book_result.lock() = Some(result);
        }

        pub fn set_confirmation(&self, confirmation: BookingConfirmation) {
            *self.confirmation.lock() = Some(confirmation);
        }

        /// Fail the next `count` calls with an HTTP 500.
        pub fn fail_next(&self, count: usize) {
            self.fail_next.store(count, Ordering::SeqCst);
        }

        /// Answer the next `count` calls with 2xx + success:false.
        pub fn reject_next(&self, count: usize) {
            self.reject_next.store(count, Ordering::SeqCst);
        }

        pub fn set_delay_ms(&self, delay_ms: usize) {
            self.delay_ms.store(delay_ms, Ordering::SeqCst);
        }

        async fn gate(&self) -> Result<(), BackendError> {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }

            let failing = self.fail_next.load(Ordering::SeqCst);
            if failing > 0 {
                self.fail_next.store(failing - 1, Ordering::SeqCst);
                return Err(BackendError::Status {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                });
            }

            let rejecting = self.reject_next.load(Ordering::SeqCst);
            if rejecting > 0 {
                self.reject_next.store(rejecting - 1, Ordering::SeqCst);
                return Err(BackendError::Rejected(
                    "offer no longer available".to_string(),
                ));
            }

            Ok(())
        }
    }

    #[async_trait]
    impl BackendApi for MockBackend {
        async fn search_destinations(
            &self,
            term: &str,
        ) -> Result<DestinationCandidates, BackendError> {
            self.calls
                .destination_searches
                .fetch_add(1, Ordering::SeqCst);
            self.gate().await?;
            Ok(self
                .destinations
                .lock()
                .get(term)
                .cloned()
                .unwrap_or_default())
        }

        async fn search_hotels(
            &self,
            city: &str,
            hotel_name: Option<&str>,
        ) -> Result<Vec<HotelDetail>, BackendError> {
            self.calls.hotel_searches.fetch_add(1, Ordering::SeqCst);
            self.gate().await?;
            Ok(self
                .hotels
                .lock()
                .iter()
                .filter(|h| h.city == city)
                .filter(|h| hotel_name.map_or(true, |name| h.name.contains(name)))
                .cloned()
                .collect())
        }

        async fn fetch_rooms(
            &self,
            _request: RoomSearchRequest,
        ) -> Result<Vec<RoomOffer>, BackendError> {
            self.calls.room_fetches.fetch_add(1, Ordering::SeqCst);
            self.gate().await?;
            Ok(self.rooms.lock().clone())
        }

        async fn pre_book(&self, request: PreBookRequest) -> Result<PreBookResult, BackendError> {
            self.calls.pre_books.fetch_add(1, Ordering::SeqCst);
            self.gate().await?;
            *self.last_pre_book.lock() = Some(request);
            self.pre_book_result
                .lock()
                .clone()
                .ok_or_else(|| BackendError::Rejected("no hold available".to_string()))
        }

        async fn confirm_booking(
            &self,
            request: ConfirmRequest,
        ) -> Result<BookingConfirmation, BackendError> {
            self.calls.confirms.fetch_add(1, Ordering::SeqCst);
            self.gate().await?;
            *self.last_confirm.lock() = Some(request);
            self.confirmation
                .lock()
                .clone()
                .ok_or_else(|| BackendError::Rejected("booking failed".to_string()))
        }
    }
}
