//! Appointment record store.
//!
//! The trait is the seam: the voice tools only see [`RecordStore`], so a
//! clinic can plug in its practice-management system. [`MemoryRecordStore`]
//! backs demos and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("slot is no longer available: {0}")]
    SlotUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: String,
    pub provider_id: String,
    pub start: DateTime<Utc>,
    pub minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub patient_name: String,
    pub provider_id: String,
    pub slot: Slot,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PatientProfile {
    pub name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
}

/// The clinic's scheduling backend, as seen by the voice tools.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn providers(&self) -> RecordResult<Vec<Provider>>;

    /// Open slots for one provider, soonest first.
    async fn available_slots(&self, provider_id: &str) -> RecordResult<Vec<Slot>>;

    async fn book(
        &self,
        provider_id: &str,
        slot_id: &str,
        patient_name: &str,
        reason: &str,
    ) -> RecordResult<Booking>;

    async fn cancel(&self, booking_id: &str) -> RecordResult<Booking>;

    /// Move a booking to a new open slot with the same provider.
    async fn reschedule(&self, booking_id: &str, new_slot_id: &str) -> RecordResult<Booking>;

    async fn update_patient(&self, profile: PatientProfile) -> RecordResult<()>;
}

#[derive(Default)]
struct StoreInner {
    providers: Vec<Provider>,
    open_slots: Vec<Slot>,
    bookings: HashMap<String, Booking>,
    patients: HashMap<String, PatientProfile>,
    next_booking: u64,
}

/// In-memory store for demos and tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<StoreInner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small clinic: two providers with open slots over the next days.
    pub fn with_demo_data() -> Self {
        Self {
            inner: RwLock::new(Self::seeded()),
        }
    }

    fn seeded() -> StoreInner {
        let mut inner = StoreInner::default();
        inner.providers = vec![
            Provider {
                id: "prov-okafor".to_string(),
                name: "Dr. Adaeze Okafor".to_string(),
                specialty: "family medicine".to_string(),
            },
            Provider {
                id: "prov-lindqvist".to_string(),
                name: "Dr. Sven Lindqvist".to_string(),
                specialty: "dermatology".to_string(),
            },
        ];
        let base = Utc::now() + Duration::days(1);
        let mut slots = Vec::new();
        for (p, provider) in ["prov-okafor", "prov-lindqvist"].iter().enumerate() {
            for s in 0..4 {
                slots.push(Slot {
                    id: format!("slot-{}-{}", p, s),
                    provider_id: provider.to_string(),
                    start: base + Duration::hours(24 * (s / 2) as i64 + 9 + 2 * (s % 2) as i64),
                    minutes: 30,
                });
            }
        }
        inner.open_slots = slots;
        inner
    }

    pub async fn add_provider(&self, provider: Provider) {
        self.inner.write().await.providers.push(provider);
    }

    pub async fn add_slot(&self, slot: Slot) {
        self.inner.write().await.open_slots.push(slot);
    }

    pub async fn patient(&self, name: &str) -> Option<PatientProfile> {
        self.inner.read().await.patients.get(name).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn providers(&self) -> RecordResult<Vec<Provider>> {
        Ok(self.inner.read().await.providers.clone())
    }

    async fn available_slots(&self, provider_id: &str) -> RecordResult<Vec<Slot>> {
        let inner = self.inner.read().await;
        if !inner.providers.iter().any(|p| p.id == provider_id) {
            return Err(RecordError::NotFound(format!("provider {}", provider_id)));
        }
        let mut slots: Vec<Slot> = inner
            .open_slots
            .iter()
            .filter(|s| s.provider_id == provider_id)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start);
        Ok(slots)
    }

    async fn book(
        &self,
        provider_id: &str,
        slot_id: &str,
        patient_name: &str,
        reason: &str,
    ) -> RecordResult<Booking> {
        if patient_name.trim().is_empty() {
            return Err(RecordError::InvalidRequest("patient name is required".to_string()));
        }
        let mut inner = self.inner.write().await;
        let index = inner
            .open_slots
            .iter()
            .position(|s| s.id == slot_id && s.provider_id == provider_id)
            .ok_or_else(|| RecordError::SlotUnavailable(slot_id.to_string()))?;
        let slot = inner.open_slots.remove(index);
        inner.next_booking += 1;
        let booking = Booking {
            id: format!("bk-{:04}", inner.next_booking),
            patient_name: patient_name.to_string(),
            provider_id: provider_id.to_string(),
            slot,
            reason: reason.to_string(),
        };
        inner.bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    async fn cancel(&self, booking_id: &str) -> RecordResult<Booking> {
        let mut inner = self.inner.write().await;
        let booking = inner
            .bookings
            .remove(booking_id)
            .ok_or_else(|| RecordError::NotFound(format!("booking {}", booking_id)))?;
        // The freed slot goes back on the board.
        inner.open_slots.push(booking.slot.clone());
        Ok(booking)
    }

    async fn reschedule(&self, booking_id: &str, new_slot_id: &str) -> RecordResult<Booking> {
        let mut inner = self.inner.write().await;
        let booking = inner
            .bookings
            .get(booking_id)
            .cloned()
            .ok_or_else(|| RecordError::NotFound(format!("booking {}", booking_id)))?;
        let index = inner
            .open_slots
            .iter()
            .position(|s| s.id == new_slot_id && s.provider_id == booking.provider_id)
            .ok_or_else(|| RecordError::SlotUnavailable(new_slot_id.to_string()))?;
        let new_slot = inner.open_slots.remove(index);
        let old_slot = booking.slot.clone();
        inner.open_slots.push(old_slot);
        let updated = Booking {
            slot: new_slot,
            ..booking
        };
        inner.bookings.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn update_patient(&self, profile: PatientProfile) -> RecordResult<()> {
        if profile.name.trim().is_empty() {
            return Err(RecordError::InvalidRequest("patient name is required".to_string()));
        }
        self.inner
            .write()
            .await
            .patients
            .insert(profile.name.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn demo_store() -> MemoryRecordStore {
        MemoryRecordStore::with_demo_data()
    }

    #[tokio::test]
    async fn booking_consumes_the_slot() {
        let store = demo_store().await;
        let slots = store.available_slots("prov-okafor").await.unwrap();
        assert!(!slots.is_empty());
        let slot = &slots[0];

        let booking = store
            .book("prov-okafor", &slot.id, "Maya Petrov", "annual checkup")
            .await
            .unwrap();
        assert_eq!(booking.slot.id, slot.id);

        let remaining = store.available_slots("prov-okafor").await.unwrap();
        assert!(remaining.iter().all(|s| s.id != slot.id));

        // Booking the same slot again fails.
        let err = store
            .book("prov-okafor", &slot.id, "Another Caller", "checkup")
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::SlotUnavailable(_)));
    }

    #[tokio::test]
    async fn cancel_frees_the_slot() {
        let store = demo_store().await;
        let slot = store.available_slots("prov-okafor").await.unwrap()[0].clone();
        let booking = store
            .book("prov-okafor", &slot.id, "Maya Petrov", "checkup")
            .await
            .unwrap();

        store.cancel(&booking.id).await.unwrap();
        let slots = store.available_slots("prov-okafor").await.unwrap();
        assert!(slots.iter().any(|s| s.id == slot.id));

        let err = store.cancel(&booking.id).await.unwrap_err();
        assert!(matches!(err, RecordError::NotFound(_)));
    }

    #[tokio::test]
    async fn reschedule_swaps_slots() {
        let store = demo_store().await;
        let slots = store.available_slots("prov-okafor").await.unwrap();
        let (first, second) = (slots[0].clone(), slots[1].clone());
        let booking = store
            .book("prov-okafor", &first.id, "Maya Petrov", "checkup")
            .await
            .unwrap();

        let updated = store.reschedule(&booking.id, &second.id).await.unwrap();
        assert_eq!(updated.slot.id, second.id);

        let open = store.available_slots("prov-okafor").await.unwrap();
        assert!(open.iter().any(|s| s.id == first.id));
        assert!(open.iter().all(|s| s.id != second.id));
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let store = demo_store().await;
        let err = store.available_slots("prov-nobody").await.unwrap_err();
        assert!(matches!(err, RecordError::NotFound(_)));
    }

    #[tokio::test]
    async fn patient_profiles_upsert() {
        let store = demo_store().await;
        store
            .update_patient(PatientProfile {
                name: "Maya Petrov".to_string(),
                phone: Some("555-0100".to_string()),
                date_of_birth: None,
            })
            .await
            .unwrap();
        let profile = store.patient("Maya Petrov").await.unwrap();
        assert_eq!(profile.phone.as_deref(), Some("555-0100"));
    }
}
