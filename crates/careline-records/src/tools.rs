//! Voice tools over the record store.
//!
//! Each tool is a thin adapter: parse the endpoint's JSON arguments, call
//! the store, shape the result for speech. Handler errors surface as tool
//! errors on the wire; they never end the call.

use crate::store::{PatientProfile, RecordStore};
use async_trait::async_trait;
use careline_voice::{ToolHandler, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

type ToolError = Box<dyn std::error::Error + Send + Sync>;

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {}", e).into())
}

/// Register every clinic tool on a session registry.
pub fn register_all(registry: &mut ToolRegistry, store: Arc<dyn RecordStore>) {
    registry.register(Arc::new(ListProviders { store: store.clone() }));
    registry.register(Arc::new(ListAvailableSlots { store: store.clone() }));
    registry.register(Arc::new(BookAppointment { store: store.clone() }));
    registry.register(Arc::new(CancelAppointment { store: store.clone() }));
    registry.register(Arc::new(RescheduleAppointment { store: store.clone() }));
    registry.register(Arc::new(UpdatePatientProfile { store }));
}

pub struct ListProviders {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for ListProviders {
    fn name(&self) -> &str {
        "list_providers"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_providers",
            "description": "List the clinic's providers and their specialties",
            "parameters": { "type": "object", "properties": {} }
        })
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        let providers = self.store.providers().await?;
        Ok(json!({ "providers": providers }))
    }
}

#[derive(Deserialize)]
struct SlotsArgs {
    provider_id: String,
}

pub struct ListAvailableSlots {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for ListAvailableSlots {
    fn name(&self) -> &str {
        "list_available_slots"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_available_slots",
            "description": "List open appointment slots for a provider, soonest first",
            "parameters": {
                "type": "object",
                "properties": {
                    "provider_id": { "type": "string" }
                },
                "required": ["provider_id"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SlotsArgs = parse_args(args)?;
        let slots = self.store.available_slots(&args.provider_id).await?;
        Ok(json!({ "slots": slots }))
    }
}

#[derive(Deserialize)]
struct BookArgs {
    provider_id: String,
    slot_id: String,
    patient_name: String,
    #[serde(default)]
    reason: String,
}

pub struct BookAppointment {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for BookAppointment {
    fn name(&self) -> &str {
        "book_appointment"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "book_appointment",
            "description": "Book an open slot for a patient",
            "parameters": {
                "type": "object",
                "properties": {
                    "provider_id": { "type": "string" },
                    "slot_id": { "type": "string" },
                    "patient_name": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["provider_id", "slot_id", "patient_name"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: BookArgs = parse_args(args)?;
        let booking = self
            .store
            .book(&args.provider_id, &args.slot_id, &args.patient_name, &args.reason)
            .await?;
        debug!(booking = %booking.id, "appointment booked");
        Ok(json!({ "status": "SUCCESS", "booking": booking }))
    }
}

#[derive(Deserialize)]
struct CancelArgs {
    booking_id: String,
}

pub struct CancelAppointment {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for CancelAppointment {
    fn name(&self) -> &str {
        "cancel_appointment"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "cancel_appointment",
            "description": "Cancel an existing booking and free its slot",
            "parameters": {
                "type": "object",
                "properties": {
                    "booking_id": { "type": "string" }
                },
                "required": ["booking_id"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CancelArgs = parse_args(args)?;
        let booking = self.store.cancel(&args.booking_id).await?;
        Ok(json!({ "status": "SUCCESS", "cancelled": booking.id }))
    }
}

#[derive(Deserialize)]
struct RescheduleArgs {
    booking_id: String,
    new_slot_id: String,
}

pub struct RescheduleAppointment {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for RescheduleAppointment {
    fn name(&self) -> &str {
        "reschedule_appointment"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "reschedule_appointment",
            "description": "Move a booking to a different open slot with the same provider",
            "parameters": {
                "type": "object",
                "properties": {
                    "booking_id": { "type": "string" },
                    "new_slot_id": { "type": "string" }
                },
                "required": ["booking_id", "new_slot_id"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RescheduleArgs = parse_args(args)?;
        let booking = self
            .store
            .reschedule(&args.booking_id, &args.new_slot_id)
            .await?;
        Ok(json!({ "status": "SUCCESS", "booking": booking }))
    }
}

pub struct UpdatePatientProfile {
    pub store: Arc<dyn RecordStore>,
}

#[async_trait]
impl ToolHandler for UpdatePatientProfile {
    fn name(&self) -> &str {
        "update_patient_profile"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "update_patient_profile",
            "description": "Create or update a patient's contact details",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "phone": { "type": "string" },
                    "date_of_birth": { "type": "string" }
                },
                "required": ["name"]
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let profile: PatientProfile = parse_args(args)?;
        self.store.update_patient(profile).await?;
        Ok(json!({ "status": "SUCCESS" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;

    fn store() -> Arc<dyn RecordStore> {
        Arc::new(MemoryRecordStore::with_demo_data())
    }

    #[tokio::test]
    async fn registry_carries_all_clinic_tools() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, store());
        for name in [
            "list_providers",
            "list_available_slots",
            "book_appointment",
            "cancel_appointment",
            "reschedule_appointment",
            "update_patient_profile",
        ] {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn book_flow_through_tool_arguments() {
        let store = store();
        let slots = ListAvailableSlots {
            store: store.clone(),
        }
        .execute(json!({ "provider_id": "prov-okafor" }))
        .await
        .unwrap();
        let slot_id = slots["slots"][0]["id"].as_str().unwrap().to_string();

        let result = BookAppointment {
            store: store.clone(),
        }
        .execute(json!({
            "provider_id": "prov-okafor",
            "slot_id": slot_id,
            "patient_name": "Maya Petrov",
            "reason": "checkup"
        }))
        .await
        .unwrap();
        assert_eq!(result["status"], "SUCCESS");
        assert!(result["booking"]["id"].as_str().unwrap().starts_with("bk-"));
    }

    #[tokio::test]
    async fn store_errors_become_tool_errors() {
        let result = CancelAppointment { store: store() }
            .execute(json!({ "booking_id": "bk-9999" }))
            .await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn missing_arguments_are_rejected() {
        let result = BookAppointment { store: store() }
            .execute(json!({ "provider_id": "prov-okafor" }))
            .await;
        assert!(result.unwrap_err().to_string().contains("invalid arguments"));
    }
}
