//! Signature attestation lookup.
//!
//! Attestation text depends on who signs (role), what is signed (note type)
//! and where the signer is licensed (jurisdiction). Rows may use `ALL` for the
//! note type and `US` as a national fallback jurisdiction; resolution walks
//! from the most specific key to the broadest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{WorkflowError, WorkflowResult};
use crate::store::AttestationStore;

pub const ALL_NOTE_TYPES: &str = "ALL";
pub const NATIONAL_JURISDICTION: &str = "US";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureAttestation {
    pub id: Uuid,
    pub role: String,
    pub note_type: String,
    pub jurisdiction: String,
    pub attestation_text: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SignatureAttestation {
    pub fn key(&self) -> AttestationKey {
        AttestationKey::new(&self.role, &self.note_type, &self.jurisdiction)
    }
}

/// Normalized `(role, note_type, jurisdiction)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttestationKey {
    pub role: String,
    pub note_type: String,
    pub jurisdiction: String,
}

impl AttestationKey {
    pub fn new(role: &str, note_type: &str, jurisdiction: &str) -> Self {
        let note_type = note_type.trim();
        let note_type = if note_type.eq_ignore_ascii_case(ALL_NOTE_TYPES) {
            ALL_NOTE_TYPES.to_string()
        } else {
            note_type.to_string()
        };
        Self {
            role: role.trim().to_ascii_uppercase(),
            note_type,
            jurisdiction: jurisdiction.trim().to_ascii_uppercase(),
        }
    }

    /// Lookup order: exact, any note type in the jurisdiction, any note type
    /// nationally. Duplicate tiers are dropped.
    pub fn fallback_chain(&self) -> Vec<AttestationKey> {
        let candidates = [
            self.clone(),
            AttestationKey {
                role: self.role.clone(),
                note_type: ALL_NOTE_TYPES.to_string(),
                jurisdiction: self.jurisdiction.clone(),
            },
            AttestationKey {
                role: self.role.clone(),
                note_type: ALL_NOTE_TYPES.to_string(),
                jurisdiction: NATIONAL_JURISDICTION.to_string(),
            },
        ];

        let mut chain: Vec<AttestationKey> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !chain.contains(&candidate) {
                chain.push(candidate);
            }
        }
        chain
    }

    pub fn matches(&self, other: &AttestationKey) -> bool {
        self.role == other.role
            && self.jurisdiction == other.jurisdiction
            && self.note_type.eq_ignore_ascii_case(&other.note_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttestation {
    pub role: String,
    pub note_type: String,
    pub jurisdiction: String,
    pub attestation_text: String,
}

pub struct AttestationResolver {
    store: Arc<dyn AttestationStore>,
    clock: Arc<dyn Clock>,
}

impl AttestationResolver {
    pub fn new(store: Arc<dyn AttestationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// First active attestation along the fallback chain.
    pub async fn resolve_attestation(
        &self,
        role: &str,
        note_type: &str,
        jurisdiction: &str,
    ) -> WorkflowResult<SignatureAttestation> {
        let requested = AttestationKey::new(role, note_type, jurisdiction);
        if requested.role.is_empty() || requested.jurisdiction.is_empty() {
            return Err(WorkflowError::validation(
                "role and jurisdiction are required to resolve an attestation",
            ));
        }

        for (tier, key) in requested.fallback_chain().into_iter().enumerate() {
            if let Some(found) = self.store.find_active_attestation(&key).await? {
                debug!(
                    role = %requested.role,
                    note_type = %requested.note_type,
                    jurisdiction = %requested.jurisdiction,
                    tier = tier + 1,
                    attestation_id = %found.id,
                    "Resolved signature attestation"
                );
                return Ok(found);
            }
        }

        Err(WorkflowError::NotFound(format!(
            "no attestation configured for role {} / note type {} / jurisdiction {}",
            requested.role, requested.note_type, requested.jurisdiction
        )))
    }

    pub async fn upsert_attestation(
        &self,
        input: NewAttestation,
    ) -> WorkflowResult<SignatureAttestation> {
        let key = AttestationKey::new(&input.role, &input.note_type, &input.jurisdiction);
        if key.role.is_empty() || key.note_type.is_empty() || key.jurisdiction.is_empty() {
            return Err(WorkflowError::validation(
                "role, note_type and jurisdiction must all be set",
            ));
        }
        if input.attestation_text.trim().is_empty() {
            return Err(WorkflowError::validation("attestation text cannot be empty"));
        }

        let attestation = SignatureAttestation {
            id: Uuid::new_v4(),
            role: key.role,
            note_type: key.note_type,
            jurisdiction: key.jurisdiction,
            attestation_text: input.attestation_text.trim().to_string(),
            is_active: true,
            created_at: self.clock.now(),
        };
        let stored = self.store.upsert_attestation(&attestation).await?;
        info!(
            attestation_id = %stored.id,
            role = %stored.role,
            note_type = %stored.note_type,
            jurisdiction = %stored.jurisdiction,
            "Attestation saved"
        );
        Ok(stored)
    }

    pub async fn deactivate_attestation(&self, id: Uuid) -> WorkflowResult<()> {
        self.store.set_attestation_active(id, false).await?;
        info!(attestation_id = %id, "Attestation deactivated");
        Ok(())
    }

    pub async fn list_attestations(&self) -> WorkflowResult<Vec<SignatureAttestation>> {
        Ok(self.store.list_attestations().await?)
    }
}
