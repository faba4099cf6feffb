// Booking-sequence orchestrator for the wholesaler back office.

pub mod backend;
pub mod records;
pub mod resolver;
pub mod session;
pub mod wizard;

// Re-export key types for convenience
pub use backend::{
    BackendApi, BackendError, ClientConfig, ConfirmData, ConfirmRequest, HttpBackend,
    PreBookRequest, RoomSearchRequest, RoomSearchResponse,
};
pub use records::{
    BookingConfirmation, CancellationPolicy, CityCandidate, DestinationCandidates, HotelCandidate,
    HotelDetail, Occupancy, PaymentMethod, PreBookResult, Price, RoomOffer, StayDates, Traveler,
};
pub use resolver::DestinationResolver;
pub use session::{SessionContext, SessionManager};
pub use wizard::{ReservationWizard, WizardError, WizardStage};
