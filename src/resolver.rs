// Destination/hotel resolver.
// Free-text input is debounced with a trailing 500ms window and only queries
// the backend once the term is longer than two characters. Every keystroke
// supersedes the previous one: a pending debounce timer as well as an
// already-in-flight query resolve to `None` instead of surfacing stale
// candidates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendApi, BackendError};
use crate::records::{CityCandidate, DestinationCandidates, HotelCandidate, HotelDetail};

const MIN_TERM_CHARS: usize = 3;

pub struct DestinationResolver<B: BackendApi> {
    backend: Arc<B>,
    debounce: Duration,
    generation: AtomicU64,
}

impl<B: BackendApi> DestinationResolver<B> {
    pub fn new(backend: Arc<B>, debounce: Duration) -> Self {
        Self {
            backend,
            debounce,
            generation: AtomicU64::new(0),
        }
    }

    /// Feed one keystroke's worth of input. Waits out the debounce window and
    /// then queries; `Ok(None)` means the input was too short or this call
    /// was superseded by a newer keystroke before it could deliver.
    pub async fn keystroke(
        &self,
        term: &str,
    ) -> Result<Option<DestinationCandidates>, BackendError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let term = term.trim();
        if term.chars().count() < MIN_TERM_CHARS {
            return Ok(None);
        }

        tokio::time::sleep(self.debounce).await;
        if self.superseded(generation) {
            tracing::debug!(%term, "debounce window cancelled by newer input");
            return Ok(None);
        }

        let candidates = self.backend.search_destinations(term).await?;

        // The query itself can be outpaced by another keystroke as well.
        if self.superseded(generation) {
            tracing::debug!(%term, "discarding stale destination results");
            return Ok(None);
        }

        tracing::debug!(
            %term,
            cities = candidates.cities.len(),
            hotels = candidates.hotels.len(),
            "destination candidates resolved"
        );
        Ok(Some(candidates))
    }

    /// All hotels in a chosen city candidate.
    pub async fn hotels_in_city(
        &self,
        city: &CityCandidate,
    ) -> Result<Vec<HotelDetail>, BackendError> {
        self.backend.search_hotels(&city.name, None).await
    }

    /// Canonical detail for a chosen hotel candidate, re-queried by
    /// city + hotel name to obtain the supplier mapping ids.
    pub async fn resolve_hotel(
        &self,
        hotel: &HotelCandidate,
    ) -> Result<Option<HotelDetail>, BackendError> {
        let matches = self
            .backend
            .search_hotels(&hotel.city, Some(&hotel.name))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Invalidate any pending debounce timer or in-flight query, as if a
    /// newer keystroke had arrived. Used on wizard reset.
    pub fn cancel_pending(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    fn cairo_candidates() -> DestinationCandidates {
        DestinationCandidates {
            cities: vec![CityCandidate {
                id: "c-cai".to_string(),
                name: "Cairo".to_string(),
                country: "EG".to_string(),
            }],
            hotels: vec![HotelCandidate {
                id: "h-1".to_string(),
                name: "Nile Grand".to_string(),
                country: "EG".to_string(),
                city: "Cairo".to_string(),
            }],
        }
    }

    fn resolver(backend: Arc<MockBackend>) -> DestinationResolver<MockBackend> {
        DestinationResolver::new(backend, Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn short_terms_never_hit_the_backend() {
        let backend = Arc::new(MockBackend::new());
        let resolver = resolver(Arc::clone(&backend));

        assert!(resolver.keystroke("Ca").await.unwrap().is_none());
        assert!(resolver.keystroke("  C  ").await.unwrap().is_none());
        assert_eq!(
            backend.calls.destination_searches.load(Ordering::SeqCst),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_search_returns_candidates() {
        let backend = Arc::new(MockBackend::new());
        backend.add_destinations("Cairo", cairo_candidates());
        let resolver = resolver(Arc::clone(&backend));

        let result = resolver.keystroke("Cairo").await.unwrap();
        let candidates = result.expect("debounced search should deliver");
        assert!(!candidates.is_empty());
        assert_eq!(candidates.cities[0].name, "Cairo");
    }

    #[tokio::test(start_paused = true)]
    async fn newer_keystroke_cancels_pending_timer() {
        let backend = Arc::new(MockBackend::new());
        backend.add_destinations("Cai", cairo_candidates());
        backend.add_destinations("Cairo", cairo_candidates());
        let resolver = Arc::new(resolver(Arc::clone(&backend)));

        let first = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.keystroke("Cai").await })
        };
        // Let the first call enter its debounce window before typing again.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = resolver.keystroke("Cairo").await.unwrap();

        assert!(first.await.unwrap().unwrap().is_none(), "superseded keystroke must not deliver");
        assert!(second.is_some());
        // Only the trailing keystroke queried the backend.
        assert_eq!(
            backend.calls.destination_searches.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_in_flight_response_is_discarded() {
        let backend = Arc::new(MockBackend::new());
        backend.add_destinations("Cairo", cairo_candidates());
        backend.set_delay_ms(300);
        let resolver = Arc::new(resolver(Arc::clone(&backend)));

        let slow = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.keystroke("Cairo").await })
        };
        // Wait past the debounce so the first query is in flight, then type.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let trailing = resolver.keystroke("Cairo").await.unwrap();

        assert!(slow.await.unwrap().unwrap().is_none());
        assert!(trailing.is_some());
    }

    #[tokio::test]
    async fn hotel_candidate_resolves_to_detail() {
        let backend = Arc::new(MockBackend::new());
        backend.set_hotels(vec![crate::records::HotelDetail {
            hotel_code: "H1001".to_string(),
            name: "Nile Grand".to_string(),
            address: "1 Corniche".to_string(),
            city: "Cairo".to_string(),
            country: "EG".to_string(),
            star_rating: Some(5),
            facilities: vec!["pool".to_string()],
            supplier_ids: vec!["HB".to_string()],
        }]);
        let resolver = DestinationResolver::new(Arc::clone(&backend), Duration::ZERO);

        let candidate = HotelCandidate {
            id: "h-1".to_string(),
            name: "Nile Grand".to_string(),
            country: "EG".to_string(),
            city: "Cairo".to_string(),
        };
        let detail = resolver
            .resolve_hotel(&candidate)
            .await
            .unwrap()
            .expect("candidate should resolve");
        assert_eq!(detail.hotel_code, "H1001");
        assert_eq!(detail.supplier_ids, vec!["HB".to_string()]);
    }
}
