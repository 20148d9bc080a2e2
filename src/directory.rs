//! Staff identity capabilities consumed by the note workflows.
//!
//! Authentication and role management live outside this crate. The workflows
//! only need to ask three questions: does this credential belong to this user,
//! what role/jurisdiction does the user sign under, and does one user
//! supervise another. [`StaffRoster`] answers them from a TOML roster file so
//! the service can run standalone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::collections::HashMap;
use std::path::Path;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::WorkflowError;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffProfile {
    pub user_id: Uuid,
    /// Signing role, e.g. `CLINICIAN`, `INTERN`, `ADMIN`
    pub role: String,
    /// Licensing jurisdiction, e.g. `GA`
    pub jurisdiction: String,
}

/// Verifies a signing PIN or password.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credential(&self, user_id: Uuid, credential: &str)
        -> Result<bool, WorkflowError>;
}

/// Role and supervision lookups.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn staff_profile(&self, user_id: Uuid) -> Result<Option<StaffProfile>, WorkflowError>;

    async fn supervises(&self, supervisor_id: Uuid, supervisee_id: Uuid)
        -> Result<bool, WorkflowError>;
}

/// PBKDF2 rounds applied to newly hashed PINs.
pub const PIN_ITERATIONS: u32 = 100_000;
const PIN_HASH_LENGTH: usize = 32;

/// Hex-encoded PBKDF2-HMAC-SHA256 of a PIN, the form stored in roster files.
pub fn hash_pin(pin: &str, salt: &str, iterations: u32) -> String {
    let mut derived = [0u8; PIN_HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt.as_bytes(), iterations, &mut derived);
    derived.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fresh random salt for one roster entry.
pub fn generate_pin_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub role: String,
    pub jurisdiction: String,
    #[serde(default)]
    pub supervisor_ids: Vec<Uuid>,
    pub pin_salt: String,
    pub pin_hash: String,
    #[serde(default = "default_pin_iterations")]
    pub pin_iterations: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn default_pin_iterations() -> u32 {
    PIN_ITERATIONS
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RosterFile {
    #[serde(default)]
    staff: Vec<RosterEntry>,
}

/// File-backed staff directory and credential verifier.
#[derive(Debug, Clone, Default)]
pub struct StaffRoster {
    entries: HashMap<Uuid, RosterEntry>,
}

impl StaffRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let file: RosterFile = toml::from_str(raw)?;
        let mut roster = Self::new();
        for entry in file.staff {
            roster.insert(entry);
        }
        Ok(roster)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let roster = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            staff = roster.len(),
            "Loaded staff roster"
        );
        Ok(roster)
    }

    /// Adds a member with a plaintext PIN (salted and hashed before storage).
    pub fn with_member(
        mut self,
        profile: StaffProfile,
        pin: &str,
        supervisor_ids: Vec<Uuid>,
    ) -> Self {
        let pin_salt = generate_pin_salt();
        self.insert(RosterEntry {
            id: profile.user_id,
            role: profile.role,
            jurisdiction: profile.jurisdiction,
            supervisor_ids,
            pin_hash: hash_pin(pin, &pin_salt, PIN_ITERATIONS),
            pin_salt,
            pin_iterations: PIN_ITERATIONS,
            active: true,
        });
        self
    }

    pub fn insert(&mut self, mut entry: RosterEntry) {
        entry.role = entry.role.trim().to_ascii_uppercase();
        entry.jurisdiction = entry.jurisdiction.trim().to_ascii_uppercase();
        entry.pin_hash = entry.pin_hash.trim().to_ascii_lowercase();
        self.entries.insert(entry.id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn active_entry(&self, id: Uuid) -> Option<&RosterEntry> {
        self.entries.get(&id).filter(|e| e.active)
    }
}

#[async_trait]
impl CredentialVerifier for StaffRoster {
    async fn verify_credential(
        &self,
        user_id: Uuid,
        credential: &str,
    ) -> Result<bool, WorkflowError> {
        let Some(entry) = self.active_entry(user_id) else {
            return Ok(false);
        };
        let presented = hash_pin(credential, &entry.pin_salt, entry.pin_iterations);
        Ok(presented.as_bytes().ct_eq(entry.pin_hash.as_bytes()).into())
    }
}

#[async_trait]
impl StaffDirectory for StaffRoster {
    async fn staff_profile(&self, user_id: Uuid) -> Result<Option<StaffProfile>, WorkflowError> {
        Ok(self.active_entry(user_id).map(|e| StaffProfile {
            user_id: e.id,
            role: e.role.clone(),
            jurisdiction: e.jurisdiction.clone(),
        }))
    }

    async fn supervises(
        &self,
        supervisor_id: Uuid,
        supervisee_id: Uuid,
    ) -> Result<bool, WorkflowError> {
        if self.active_entry(supervisor_id).is_none() {
            return Ok(false);
        }
        Ok(self
            .active_entry(supervisee_id)
            .map(|e| e.supervisor_ids.contains(&supervisor_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: Uuid, role: &str) -> StaffProfile {
        StaffProfile {
            user_id: id,
            role: role.to_string(),
            jurisdiction: "ga".to_string(),
        }
    }

    #[tokio::test]
    async fn test_roster_verifies_pins() {
        let clinician = Uuid::new_v4();
        let roster = StaffRoster::new().with_member(profile(clinician, "clinician"), "4321", vec![]);

        assert!(roster.verify_credential(clinician, "4321").await.unwrap());
        assert!(!roster.verify_credential(clinician, "1234").await.unwrap());
        assert!(!roster.verify_credential(Uuid::new_v4(), "4321").await.unwrap());
    }

    #[tokio::test]
    async fn test_roster_normalizes_role_and_jurisdiction() {
        let clinician = Uuid::new_v4();
        let roster = StaffRoster::new().with_member(profile(clinician, " intern "), "0000", vec![]);
        let found = roster.staff_profile(clinician).await.unwrap().unwrap();
        assert_eq!(found.role, "INTERN");
        assert_eq!(found.jurisdiction, "GA");
    }

    #[tokio::test]
    async fn test_supervision_follows_supervisor_ids() {
        let supervisor = Uuid::new_v4();
        let intern = Uuid::new_v4();
        let roster = StaffRoster::new()
            .with_member(profile(supervisor, "supervisor"), "1111", vec![])
            .with_member(profile(intern, "intern"), "2222", vec![supervisor]);

        assert!(roster.supervises(supervisor, intern).await.unwrap());
        assert!(!roster.supervises(intern, supervisor).await.unwrap());
    }

    #[test]
    fn test_roster_parses_toml_and_skips_inactive() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"
            [[staff]]
            id = "{id}"
            role = "clinician"
            jurisdiction = "GA"
            pin_salt = "roster-salt"
            pin_hash = "{}"
            active = false
            "#,
            hash_pin("9999", "roster-salt", PIN_ITERATIONS)
        );
        let roster = StaffRoster::from_toml_str(&raw).unwrap();
        assert_eq!(roster.len(), 1);
        assert!(roster.active_entry(id).is_none());
    }

    #[tokio::test]
    async fn test_roster_file_honors_stored_iterations() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"
            [[staff]]
            id = "{id}"
            role = "clinician"
            jurisdiction = "GA"
            pin_salt = "a1b2c3"
            pin_hash = "{}"
            pin_iterations = 1000
            "#,
            hash_pin("2468", "a1b2c3", 1000).to_ascii_uppercase()
        );
        let roster = StaffRoster::from_toml_str(&raw).unwrap();
        assert!(roster.verify_credential(id, "2468").await.unwrap());
        assert!(!roster.verify_credential(id, "2469").await.unwrap());
    }

    #[test]
    fn test_hash_pin_is_lower_hex() {
        let hashed = hash_pin("1234", "salt", 1000);
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_pin_hash_depends_on_salt_and_rounds() {
        let base = hash_pin("1234", "salt-a", 1000);
        assert_eq!(base, hash_pin("1234", "salt-a", 1000));
        assert_ne!(base, hash_pin("1234", "salt-b", 1000));
        assert_ne!(base, hash_pin("1234", "salt-a", 1001));
        assert_ne!(base, hash_pin("4321", "salt-a", 1000));
    }

    #[tokio::test]
    async fn test_same_pin_gets_distinct_salts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let roster = StaffRoster::new()
            .with_member(profile(a, "clinician"), "1234", vec![])
            .with_member(profile(b, "clinician"), "1234", vec![]);

        let (ea, eb) = (&roster.entries[&a], &roster.entries[&b]);
        assert_ne!(ea.pin_salt, eb.pin_salt);
        assert_ne!(ea.pin_hash, eb.pin_hash);
        assert_eq!(ea.pin_iterations, PIN_ITERATIONS);
        assert!(roster.verify_credential(a, "1234").await.unwrap());
        assert!(roster.verify_credential(b, "1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_plain_sha256_digest_is_not_accepted() {
        use sha2::Digest;

        let id = Uuid::new_v4();
        let roster = StaffRoster::new().with_member(profile(id, "clinician"), "1234", vec![]);
        let unsalted: String = Sha256::digest(b"1234")
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        assert_ne!(roster.entries[&id].pin_hash, unsalted);
        assert!(!roster.verify_credential(id, &unsalted).await.unwrap());
    }
}
