// Manual-reservation wizard.
// Sequences the four dependent backend operations (destination search, room
// availability, pre-book, confirm) and owns the session-scoped state each
// stage derives from the previous one. Control flows strictly forward; the
// only way back is a full reset.
//
// Two hardenings over the historical behavior: every network stage holds a
// single in-flight guard (a second click is rejected instead of racing), and
// a wizard-wide generation counter discards late responses once the state
// they were fetched for has been reset or invalidated.

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::backend::{
    BackendApi, BackendError, ClientConfig, ConfirmData, ConfirmRequest, PreBookRequest,
    RoomSearchRequest,
};
use crate::records::{
    BookingConfirmation, CancellationPolicy, DestinationCandidates, HotelDetail, PaymentMethod,
    PreBookResult, RoomOffer, StayDates, Traveler,
};
use crate::resolver::DestinationResolver;
use crate::session::SessionContext;

#[derive(Error, Debug)]
pub enum WizardError {
    /// The gating precondition for this operation is not met.
    #[error("stage not ready: {0}")]
    StageNotReady(&'static str),

    #[error("{stage} request already in flight")]
    RequestInFlight { stage: &'static str },

    /// The response arrived after a reset (or an input change) invalidated
    /// the state it was fetched for; nothing was mutated.
    #[error("request superseded")]
    Superseded,

    #[error("unknown selection: {0}")]
    UnknownSelection(String),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Wizard stage, derived from which data is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStage {
    Idle,
    DestinationChosen,
    HotelChosen,
    RoomsFetched,
    RoomSelected,
    PreBooked,
    Confirmed,
}

/// One-permit guard per network stage.
struct StageGate {
    in_flight: AtomicBool,
}

impl StageGate {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self, stage: &'static str) -> Result<GateGuard<'_>, WizardError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(GateGuard {
                flag: &self.in_flight,
            })
        } else {
            Err(WizardError::RequestInFlight { stage })
        }
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct GateGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct WizardData {
    candidates: Option<DestinationCandidates>,
    hotel_choices: Vec<HotelDetail>,
    hotel: Option<HotelDetail>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    offers: Vec<RoomOffer>,
    selected_room: Option<String>,
    pre_book: Option<PreBookResult>,
    payment: Option<PaymentMethod>,
    agency_reference: String,
    traveler: Option<Traveler>,
    confirmation: Option<BookingConfirmation>,
}

impl WizardData {
    fn selected_offer(&self) -> Option<&RoomOffer> {
        let token = self.selected_room.as_deref()?;
        self.offers.iter().find(|o| o.room_token == token)
    }

    /// Drop everything downstream of the availability stage.
    fn clear_from_offers(&mut self) {
        self.offers.clear();
        self.clear_from_selection();
    }

    /// Drop everything downstream of the room selection. The payment choice
    /// is sticky; re-selecting a non-refundable room coerces it instead.
    fn clear_from_selection(&mut self) {
        self.selected_room = None;
        self.pre_book = None;
        self.confirmation = None;
    }
}

pub struct ReservationWizard<B: BackendApi> {
    backend: Arc<B>,
    session: SessionContext,
    config: ClientConfig,
    resolver: DestinationResolver<B>,
    data: Mutex<WizardData>,
    generation: AtomicU64,
    availability_gate: StageGate,
    pre_book_gate: StageGate,
    confirm_gate: StageGate,
}

impl<B: BackendApi> ReservationWizard<B> {
    pub fn new(backend: Arc<B>, session: SessionContext, config: ClientConfig) -> Self {
        let resolver = DestinationResolver::new(
            Arc::clone(&backend),
            Duration::from_millis(config.debounce_ms),
        );
        Self {
            backend,
            session,
            config,
            resolver,
            data: Mutex::new(WizardData::default()),
            generation: AtomicU64::new(0),
            availability_gate: StageGate::new(),
            pre_book_gate: StageGate::new(),
            confirm_gate: StageGate::new(),
        }
    }

    pub fn stage(&self) -> WizardStage {
        let data = self.data.lock();
        if data.confirmation.is_some() {
            WizardStage::Confirmed
        } else if data.pre_book.is_some() {
            WizardStage::PreBooked
        } else if data.selected_room.is_some() {
            WizardStage::RoomSelected
        } else if !data.offers.is_empty() {
            WizardStage::RoomsFetched
        } else if data.hotel.is_some() {
            WizardStage::HotelChosen
        } else if !data.hotel_choices.is_empty() {
            WizardStage::DestinationChosen
        } else {
            WizardStage::Idle
        }
    }

    // --- destination stage ---

    /// Debounced free-text search. `Ok(None)` means the input was too short
    /// or a newer keystroke superseded this one.
    pub async fn search_destination(
        &self,
        term: &str,
    ) -> Result<Option<DestinationCandidates>, WizardError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let candidates = self.resolver.keystroke(term).await?;
        if let Some(candidates) = candidates {
            if self.generation.load(Ordering::SeqCst) != generation {
                return Err(WizardError::Superseded);
            }
            self.data.lock().candidates = Some(candidates.clone());
            return Ok(Some(candidates));
        }
        Ok(None)
    }

    pub fn candidates(&self) -> Option<DestinationCandidates> {
        self.data.lock().candidates.clone()
    }

    /// Resolve a city candidate to the hotels it contains.
    pub async fn choose_city(&self, index: usize) -> Result<Vec<HotelDetail>, WizardError> {
        let city = {
            let data = self.data.lock();
            let candidates = data
                .candidates
                .as_ref()
                .ok_or(WizardError::StageNotReady("choose city"))?;
            candidates
                .cities
                .get(index)
                .cloned()
                .ok_or_else(|| WizardError::UnknownSelection(format!("city #{index}")))?
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let hotels = self.resolver.hotels_in_city(&city).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(WizardError::Superseded);
        }

        tracing::debug!(city = %city.name, hotels = hotels.len(), "city chosen");
        self.data.lock().hotel_choices = hotels.clone();
        Ok(hotels)
    }

    /// Resolve a hotel candidate straight to its canonical detail and pick it.
    pub async fn choose_hotel_candidate(&self, index: usize) -> Result<HotelDetail, WizardError> {
        let candidate = {
            let data = self.data.lock();
            let candidates = data
                .candidates
                .as_ref()
                .ok_or(WizardError::StageNotReady("choose hotel"))?;
            candidates
                .hotels
                .get(index)
                .cloned()
                .ok_or_else(|| WizardError::UnknownSelection(format!("hotel #{index}")))?
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let detail = self
            .resolver
            .resolve_hotel(&candidate)
            .await?
            .ok_or_else(|| WizardError::UnknownSelection(candidate.name.clone()))?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(WizardError::Superseded);
        }

        let mut data = self.data.lock();
        data.hotel_choices = vec![detail.clone()];
        data.hotel = Some(detail.clone());
        data.clear_from_offers();
        Ok(detail)
    }

    pub fn hotel_choices(&self) -> Vec<HotelDetail> {
        self.data.lock().hotel_choices.clone()
    }

    /// Pick a hotel from the dropdown populated by `choose_city`.
    pub fn pick_hotel(&self, index: usize) -> Result<HotelDetail, WizardError> {
        let mut data = self.data.lock();
        let detail = data
            .hotel_choices
            .get(index)
            .cloned()
            .ok_or_else(|| WizardError::UnknownSelection(format!("hotel #{index}")))?;
        tracing::debug!(hotel = %detail.name, "hotel picked");
        data.hotel = Some(detail.clone());
        data.clear_from_offers();
        Ok(detail)
    }

    pub fn hotel(&self) -> Option<HotelDetail> {
        self.data.lock().hotel.clone()
    }

    // --- dates ---

    pub fn set_check_in(&self, date: Option<NaiveDate>) {
        let mut data = self.data.lock();
        data.check_in = date;
        data.clear_from_offers();
    }

    pub fn set_check_out(&self, date: Option<NaiveDate>) {
        let mut data = self.data.lock();
        data.check_out = date;
        data.clear_from_offers();
    }

    pub fn stay_dates(&self) -> Option<StayDates> {
        let data = self.data.lock();
        Some(StayDates::new(data.check_in?, data.check_out?))
    }

    pub fn nights(&self) -> Option<i64> {
        self.stay_dates().and_then(|stay| stay.nights())
    }

    /// Nights count as rendered next to the date pickers; empty when the
    /// range is missing, empty or inverted.
    pub fn nights_display(&self) -> String {
        self.stay_dates()
            .map(|stay| stay.nights_display())
            .unwrap_or_default()
    }

    // --- availability stage ---

    pub fn can_check_availability(&self) -> bool {
        let data = self.data.lock();
        data.hotel.is_some() && data.check_in.is_some() && data.check_out.is_some()
    }

    pub async fn check_availability(&self) -> Result<usize, WizardError> {
        let _guard = self.availability_gate.try_acquire("availability")?;

        let request = {
            let data = self.data.lock();
            let hotel = data
                .hotel
                .as_ref()
                .ok_or(WizardError::StageNotReady("check availability"))?;
            let (check_in, check_out) = match (data.check_in, data.check_out) {
                (Some(check_in), Some(check_out)) => (check_in, check_out),
                _ => return Err(WizardError::StageNotReady("check availability")),
            };
            RoomSearchRequest {
                supplier_id: hotel.supplier_ids.clone(),
                agency_id: self.session.agency_id().to_string(),
                check_in,
                check_out,
                occupancy: self.config.default_occupancy,
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let offers = self.backend.fetch_rooms(request).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(WizardError::Superseded);
        }

        tracing::debug!(offers = offers.len(), "availability fetched");
        let mut data = self.data.lock();
        data.clear_from_offers();
        data.offers = offers;
        Ok(data.offers.len())
    }

    pub fn offers(&self) -> Vec<RoomOffer> {
        self.data.lock().offers.clone()
    }

    // --- room selection ---

    /// Toggle a room row by its supplier token: selecting an already-selected
    /// room deselects it. Returns whether the room ended up selected.
    pub fn toggle_room(&self, room_token: &str) -> Result<bool, WizardError> {
        let mut data = self.data.lock();
        if data.offers.iter().all(|o| o.room_token != room_token) {
            return Err(WizardError::UnknownSelection(room_token.to_string()));
        }

        if data.selected_room.as_deref() == Some(room_token) {
            data.clear_from_selection();
            tracing::debug!(%room_token, "room deselected");
            return Ok(false);
        }

        data.selected_room = Some(room_token.to_string());
        data.pre_book = None;
        data.confirmation = None;
        // Non-refundable offers are settled on credit, whatever was chosen
        // before.
        if let (Some(offer), Some(_)) = (data.selected_offer(), data.payment) {
            if !offer.refundable {
                data.payment = Some(PaymentMethod::Credit);
            }
        }
        tracing::debug!(%room_token, "room selected");
        Ok(true)
    }

    pub fn selected_room(&self) -> Option<RoomOffer> {
        self.data.lock().selected_offer().cloned()
    }

    pub fn can_proceed(&self) -> bool {
        self.data.lock().selected_room.is_some()
    }

    // --- pre-book stage ---

    pub async fn pre_book(&self) -> Result<PreBookResult, WizardError> {
        let _guard = self.pre_book_gate.try_acquire("pre-book")?;

        let (request, refundable) = {
            let data = self.data.lock();
            let offer = data
                .selected_offer()
                .ok_or(WizardError::StageNotReady("pre-book"))?;
            let (check_in, check_out) = match (data.check_in, data.check_out) {
                (Some(check_in), Some(check_out)) => (check_in, check_out),
                _ => return Err(WizardError::StageNotReady("pre-book")),
            };
            (
                PreBookRequest {
                    supplier: offer.supplier.clone(),
                    hotel_code: offer.hotel_code.clone(),
                    check_in,
                    check_out,
                    result_token: offer.result_token.clone(),
                    srk: offer.srk.clone(),
                    offer_index: offer.offer_index,
                    rooms: vec![offer.room_token.clone()],
                },
                offer.refundable,
            )
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.backend.pre_book(request).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(WizardError::Superseded);
        }

        tracing::debug!(token = %result.availability_token, "offer held");
        let mut data = self.data.lock();
        data.pre_book = Some(result.clone());
        if !refundable {
            data.payment = Some(PaymentMethod::Credit);
        }
        Ok(result)
    }

    pub fn pre_book_result(&self) -> Option<PreBookResult> {
        self.data.lock().pre_book.clone()
    }

    /// Policy shown to the operator: the pre-book result's policy is
    /// authoritative and supersedes the offer's original one.
    pub fn display_policy(&self) -> Option<CancellationPolicy> {
        let data = self.data.lock();
        data.pre_book
            .as_ref()
            .and_then(|p| p.cancellation_policy.clone())
            .or_else(|| {
                data.selected_offer()
                    .and_then(|o| o.cancellation_policy.clone())
            })
    }

    // --- payment & confirm stage ---

    /// Choose how the booking is settled. Requires a held offer; a
    /// non-refundable room forces credit regardless of the requested method.
    /// Returns the method actually in effect.
    pub fn set_payment_method(&self, method: PaymentMethod) -> Result<PaymentMethod, WizardError> {
        let mut data = self.data.lock();
        if data.pre_book.is_none() {
            return Err(WizardError::StageNotReady("choose payment"));
        }
        let effective = match data.selected_offer() {
            Some(offer) if !offer.refundable => PaymentMethod::Credit,
            _ => method,
        };
        data.payment = Some(effective);
        Ok(effective)
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.data.lock().payment
    }

    pub fn set_agency_reference(&self, reference: impl Into<String>) {
        self.data.lock().agency_reference = reference.into();
    }

    pub fn agency_reference(&self) -> String {
        self.data.lock().agency_reference.clone()
    }

    pub fn set_traveler(&self, traveler: Traveler) {
        self.data.lock().traveler = Some(traveler);
    }

    pub fn can_finalize(&self) -> bool {
        let data = self.data.lock();
        data.confirmation.is_none()
            && data.pre_book.is_some()
            && data.payment.is_some()
            && !data.agency_reference.trim().is_empty()
            && !self.confirm_gate.is_busy()
    }

    pub async fn confirm(&self) -> Result<BookingConfirmation, WizardError> {
        let _guard = self.confirm_gate.try_acquire("confirm")?;

        let request = {
            let data = self.data.lock();
            let offer = data
                .selected_offer()
                .ok_or(WizardError::StageNotReady("finalize"))?;
            let pre_book = data
                .pre_book
                .as_ref()
                .ok_or(WizardError::StageNotReady("finalize"))?;
            let payment = data
                .payment
                .ok_or(WizardError::StageNotReady("finalize"))?;
            if data.agency_reference.trim().is_empty() {
                return Err(WizardError::StageNotReady("finalize"));
            }
            let (check_in, check_out) = match (data.check_in, data.check_out) {
                (Some(check_in), Some(check_out)) => (check_in, check_out),
                _ => return Err(WizardError::StageNotReady("finalize")),
            };
            ConfirmRequest {
                provider: offer.supplier.clone(),
                stay_details: StayDates::new(check_in, check_out),
                srk: offer.srk.clone(),
                result_token: offer.result_token.clone(),
                availability_token: pre_book.availability_token.clone(),
                payment,
                reference: data.agency_reference.clone(),
                rooms: vec![offer.room_token.clone()],
                booking_type: "manual".to_string(),
                data: ConfirmData {
                    traveler: data
                        .traveler
                        .clone()
                        .unwrap_or_else(Traveler::placeholder),
                    markup_percent: self.session.markup_percent(),
                },
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let confirmation = self.backend.confirm_booking(request).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(WizardError::Superseded);
        }

        tracing::debug!(booking_id = %confirmation.booking_id, "booking confirmed");
        self.data.lock().confirmation = Some(confirmation.clone());
        Ok(confirmation)
    }

    pub fn confirmation(&self) -> Option<BookingConfirmation> {
        self.data.lock().confirmation.clone()
    }

    // --- reset ---

    /// Clear every field and return to `Idle`. Responses still in flight for
    /// the old state are discarded when they land.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.resolver.cancel_pending();
        *self.data.lock() = WizardData::default();
        tracing::debug!("wizard reset");
    }
}
