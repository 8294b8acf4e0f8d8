use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::INITIAL_ESTIMATE_SECS;
use crate::countdown::Countdown;
use crate::encoder::ImageEncoder;
use crate::error::GenerationError;
use crate::models::{GenerationRequest, GenerationState, ImageSource, Wardrobe};
use crate::prompt;
use crate::quota::QuotaTracker;
use crate::resolver;
use crate::traits::GenerationBackend;

/// Drives one user-initiated generation at a time, from precondition checks to quota commit.
#[derive(Clone)]
pub struct OutfitStudio {
    encoder: ImageEncoder,
    backend: Arc<dyn GenerationBackend>,
    quota: QuotaTracker,
    state: Arc<watch::Sender<GenerationState>>,
    estimate_secs: u32,
}

impl OutfitStudio {
    pub fn new(encoder: ImageEncoder, backend: Arc<dyn GenerationBackend>, quota: QuotaTracker) -> Self {
        let (state, _) = watch::channel(GenerationState::Idle);

        Self {
            encoder,
            backend,
            quota,
            state: Arc::new(state),
            estimate_secs: INITIAL_ESTIMATE_SECS,
        }
    }

    pub fn with_estimate(mut self, secs: u32) -> Self {
        self.estimate_secs = secs;
        self
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn state(&self) -> GenerationState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change, including countdown ticks
    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    /// Runs a full generation and returns the image as a `data:` URL.
    ///
    /// Refused with `AlreadyInFlight`, leaving the current state alone, while
    /// another generation is validating or in flight. Every other outcome
    /// leaves the studio in `Succeeded` or `Failed`, both of which accept a
    /// new start.
    pub async fn start(
        &self,
        profile: Option<&ImageSource>,
        wardrobe: &Wardrobe,
    ) -> Result<String, GenerationError> {
        self.claim()?;

        let outcome = self.run(profile, wardrobe).await;
        match &outcome {
            Ok(image_data_url) => {
                self.state.send_replace(GenerationState::Succeeded {
                    image_data_url: image_data_url.clone(),
                });
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                self.state.send_replace(GenerationState::Failed {
                    kind: e.kind(),
                    message: e.user_message(),
                });
            }
        }

        outcome
    }

    fn claim(&self) -> Result<(), GenerationError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = GenerationState::Validating;
            claimed = true;
            true
        });

        if claimed {
            Ok(())
        } else {
            Err(GenerationError::AlreadyInFlight)
        }
    }

    async fn run(
        &self,
        profile: Option<&ImageSource>,
        wardrobe: &Wardrobe,
    ) -> Result<String, GenerationError> {
        if !self.quota.check_and_reserve().await? {
            return Err(GenerationError::QuotaExhausted {
                limit: self.quota.limit(),
            });
        }

        let Some(profile) = profile else {
            return Err(GenerationError::MissingProfileImage);
        };

        self.backend.preflight()?;

        self.state.send_replace(GenerationState::InFlight {
            remaining_secs: self.estimate_secs.max(1),
        });

        let image_data_url = {
            let state = self.state.clone();
            let _countdown = Countdown::start(self.estimate_secs, move |remaining| {
                state.send_if_modified(|current| match current {
                    GenerationState::InFlight { remaining_secs } => {
                        *remaining_secs = remaining;
                        true
                    }
                    _ => false,
                });
            });

            self.generate(profile, wardrobe).await?
        };

        // quota is advisory, the image is returned even if the write fails
        if let Err(e) = self.quota.commit().await {
            error!("Failed to record quota usage: {}", e);
        }

        Ok(image_data_url)
    }

    async fn generate(
        &self,
        profile: &ImageSource,
        wardrobe: &Wardrobe,
    ) -> Result<String, GenerationError> {
        let resolved = resolver::resolve_outfit(&self.encoder, Some(profile), wardrobe).await;
        let instruction = prompt::assemble(&resolved.references);
        let request = GenerationRequest::new(resolved.blocks, instruction);

        let image = self.backend.generate(&request).await?;
        info!("Outfit generated");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::Notify;

    use super::*;
    use crate::encoder::tests::StubFetcher;
    use crate::error::ErrorKind;
    use crate::models::{ClothingItem, QuotaRecord, Slot};
    use crate::quota::MemoryQuotaStore;

    const IMAGE: &str = "data:image/png;base64,b3V0Zml0";

    #[derive(Default)]
    struct FakeBackend {
        missing_key: bool,
        failures: Mutex<VecDeque<GenerationError>>,
        requests: Mutex<Vec<GenerationRequest>>,
        gate: Option<Arc<Notify>>,
        delay: Option<Duration>,
    }

    impl FakeBackend {
        fn failing(count: usize) -> Self {
            let failures = (0..count)
                .map(|n| GenerationError::TransportFailure(anyhow!("connection reset #{n}")))
                .collect();
            Self {
                failures: Mutex::new(failures),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> GenerationRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for FakeBackend {
        fn preflight(&self) -> Result<(), GenerationError> {
            if self.missing_key {
                Err(GenerationError::MissingCredential)
            } else {
                Ok(())
            }
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(IMAGE.to_string()),
            }
        }
    }

    struct Harness {
        studio: OutfitStudio,
        backend: Arc<FakeBackend>,
        fetcher: Arc<StubFetcher>,
        store: Arc<MemoryQuotaStore>,
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn harness(backend: FakeBackend, fetcher: StubFetcher, used: u32) -> Harness {
        let backend = Arc::new(backend);
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryQuotaStore::with_record(QuotaRecord {
            date: today(),
            count: used,
        }));

        let quota = QuotaTracker::new(store.clone()).with_clock(today);
        let studio = OutfitStudio::new(ImageEncoder::new(fetcher.clone()), backend.clone(), quota);

        Harness {
            studio,
            backend,
            fetcher,
            store,
        }
    }

    fn profile() -> ImageSource {
        ImageSource::uploaded(vec![0xff, 0xd8], "image/jpeg")
    }

    #[tokio::test]
    async fn single_upload_outfit_succeeds_and_counts() {
        let h = harness(FakeBackend::default(), StubFetcher::default(), 0);
        let mut wardrobe = Wardrobe::default();
        wardrobe.add(Slot::UpperBody, ClothingItem::uploaded(vec![0x01, 0x02, 0x03], "image/jpeg"));

        let image = h.studio.start(Some(&profile()), &wardrobe).await.unwrap();

        assert_eq!(image, IMAGE);
        let request = h.backend.last_request();
        assert_eq!(request.parts.len(), 3);
        assert_eq!(request.image_count(), 2);
        let text = request.instruction().unwrap();
        assert!(text.contains("[IMAGE_1]"));
        assert!(text.contains("[IMAGE_2]"));
        assert!(!text.contains("[IMAGE_3]"));
        assert_eq!(h.studio.quota().peek().await.unwrap(), (1, 10));
        assert_eq!(
            h.studio.state(),
            GenerationState::Succeeded {
                image_data_url: IMAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn exhausted_quota_refuses_without_network() {
        let fetcher = StubFetcher::default().with("https://cdn/top.png", b"t", None);
        let h = harness(FakeBackend::default(), fetcher, 10);
        let mut wardrobe = Wardrobe::default();
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/top.png"));

        let err = h.studio.start(Some(&profile()), &wardrobe).await.unwrap_err();

        assert!(matches!(err, GenerationError::QuotaExhausted { limit: 10 }));
        assert_eq!(h.backend.calls(), 0);
        assert_eq!(h.fetcher.call_count(), 0);
        assert!(matches!(
            h.studio.state(),
            GenerationState::Failed { kind: ErrorKind::QuotaExhausted, .. }
        ));
    }

    #[tokio::test]
    async fn missing_profile_is_rejected() {
        let h = harness(FakeBackend::default(), StubFetcher::default(), 0);

        let err = h.studio.start(None, &Wardrobe::default()).await.unwrap_err();

        assert!(matches!(err, GenerationError::MissingProfileImage));
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_download() {
        let backend = FakeBackend {
            missing_key: true,
            ..FakeBackend::default()
        };
        let h = harness(backend, StubFetcher::default(), 0);

        let err = h
            .studio
            .start(Some(&ImageSource::remote("https://cdn/profile.png")), &Wardrobe::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::MissingCredential));
        assert_eq!(h.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn transport_failures_never_consume_quota() {
        let h = harness(FakeBackend::failing(4), StubFetcher::default(), 0);

        for _ in 0..4 {
            let err = h.studio.start(Some(&profile()), &Wardrobe::default()).await.unwrap_err();
            assert!(matches!(err, GenerationError::TransportFailure(_)));
            assert!(matches!(
                h.studio.state(),
                GenerationState::Failed { kind: ErrorKind::TransportFailure, .. }
            ));
        }

        assert_eq!(h.studio.quota().peek().await.unwrap().0, 0);
        assert_eq!(h.store.snapshot().unwrap().count, 0);

        // a retry is a fresh attempt
        h.studio.start(Some(&profile()), &Wardrobe::default()).await.unwrap();
        assert_eq!(h.studio.quota().peek().await.unwrap().0, 1);
    }

    #[tokio::test]
    async fn one_bad_layer_does_not_fail_the_request() {
        let fetcher = StubFetcher::default()
            .with("https://cdn/shirt.png", b"s", Some("image/png"))
            .with("https://cdn/jeans.png", b"j", Some("image/png"));
        let h = harness(FakeBackend::default(), fetcher, 0);

        let mut wardrobe = Wardrobe::default();
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/shirt.png"));
        wardrobe.add(Slot::UpperBody, ClothingItem::remote("https://cdn/torn.png"));
        wardrobe.add(Slot::LowerBody, ClothingItem::remote("https://cdn/jeans.png"));

        h.studio.start(Some(&profile()), &wardrobe).await.unwrap();

        let request = h.backend.last_request();
        assert_eq!(request.image_count(), 3);
        let text = request.instruction().unwrap();
        assert!(text.contains("- items: [IMAGE_2]\n"));
        assert!(text.contains("- items: [IMAGE_3]\n"));
    }

    #[tokio::test]
    async fn references_match_parts_for_a_full_wardrobe() {
        let h = harness(FakeBackend::default(), StubFetcher::default(), 0);
        let mut wardrobe = Wardrobe::default();
        for slot in Slot::ALL {
            for n in 0..slot.capacity() {
                wardrobe.add(slot, ClothingItem::uploaded(vec![n as u8], "image/png"));
            }
        }

        h.studio.start(Some(&profile()), &wardrobe).await.unwrap();

        let request = h.backend.last_request();
        let text = request.instruction().unwrap();
        assert_eq!(request.image_count(), 10);
        assert_eq!(text.matches("[IMAGE_").count(), request.image_count());
        assert!(!text.contains(": NO_IMAGE_PROVIDED"));
    }

    #[tokio::test]
    async fn second_start_while_in_flight_is_refused() {
        let gate = Arc::new(Notify::new());
        let backend = FakeBackend {
            gate: Some(gate.clone()),
            ..FakeBackend::default()
        };
        let h = harness(backend, StubFetcher::default(), 0);
        let wardrobe = Wardrobe::default();
        let profile = profile();

        let (first, second) = tokio::join!(h.studio.start(Some(&profile), &wardrobe), async {
            let refused = h.studio.start(Some(&profile), &wardrobe).await;
            assert!(h.studio.state().is_busy());
            gate.notify_one();
            refused
        });

        assert_eq!(first.unwrap(), IMAGE);
        assert!(matches!(second, Err(GenerationError::AlreadyInFlight)));
        assert_eq!(h.backend.calls(), 1);
        assert_eq!(h.studio.quota().peek().await.unwrap().0, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_is_reflected_and_stops_on_completion() {
        let backend = FakeBackend {
            delay: Some(Duration::from_secs(30)),
            ..FakeBackend::default()
        };
        let h = harness(backend, StubFetcher::default(), 0);
        let studio = h.studio.clone().with_estimate(5);

        let mut rx = studio.subscribe();
        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                let done = matches!(state, GenerationState::Succeeded { .. });
                seen.push(state);
                if done {
                    break;
                }
            }
            seen
        });

        studio.start(Some(&profile()), &Wardrobe::default()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let seen = observer.await.unwrap();
        let remaining: Vec<u32> = seen
            .iter()
            .filter_map(|state| match state {
                GenerationState::InFlight { remaining_secs } => Some(*remaining_secs),
                _ => None,
            })
            .collect();

        assert_eq!(remaining.first(), Some(&5));
        assert_eq!(remaining.last(), Some(&1));
        assert!(remaining.windows(2).all(|w| w[0] >= w[1]));
        assert!(remaining.iter().all(|n| *n >= 1));
        assert!(matches!(studio.state(), GenerationState::Succeeded { .. }));
    }
}
