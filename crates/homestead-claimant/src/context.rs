//! Explicitly constructed claim context.
//!
//! One [`ClaimContext`] exists per server session. It bundles the
//! persistence collaborator, the notification listener and the server-wide
//! rules, and is shared by the registry and every live claimant.

use std::sync::Arc;

use crate::notify::{ClaimEvent, ClaimListener, NoopListener};
use crate::rank::PermissionTable;
use crate::record::ClaimantRecord;
use crate::store::{ClaimStore, StoreError};

/// Rules for town names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TownNameRules {
    /// Maximum length in characters.
    pub max_len: usize,
    /// Accept spaces inside names.
    pub allow_whitespace: bool,
}

impl Default for TownNameRules {
    fn default() -> Self {
        Self {
            max_len: 32,
            allow_whitespace: false,
        }
    }
}

impl TownNameRules {
    /// Returns the trimmed name if it satisfies the rules.
    pub fn normalize(&self, name: &str) -> Option<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().count() > self.max_len {
            return None;
        }
        let valid = trimmed.chars().all(|c| {
            c.is_alphanumeric() || c == '_' || c == '-' || (self.allow_whitespace && c == ' ')
        });
        valid.then(|| trimmed.to_string())
    }
}

/// Shared services and rules for one server session.
pub struct ClaimContext {
    store: Arc<dyn ClaimStore>,
    listener: Arc<dyn ClaimListener>,
    permissions: PermissionTable,
    town_names: TownNameRules,
    save_on_mutation: bool,
}

impl ClaimContext {
    /// Creates a context over `store` with built-in permissions, no
    /// listener, and save-on-mutation enabled.
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self {
            store,
            listener: Arc::new(NoopListener),
            permissions: PermissionTable::builtin(),
            town_names: TownNameRules::default(),
            save_on_mutation: true,
        }
    }

    /// Replaces the notification listener.
    pub fn with_listener(mut self, listener: Arc<dyn ClaimListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Replaces the server-wide permission table.
    pub fn with_permissions(mut self, permissions: PermissionTable) -> Self {
        self.permissions = permissions;
        self
    }

    /// Replaces the town name rules.
    pub fn with_town_names(mut self, rules: TownNameRules) -> Self {
        self.town_names = rules;
        self
    }

    /// Chooses between writing on every change and explicit save passes.
    pub fn with_save_on_mutation(mut self, enabled: bool) -> Self {
        self.save_on_mutation = enabled;
        self
    }

    /// The persistence collaborator.
    pub fn store(&self) -> &dyn ClaimStore {
        self.store.as_ref()
    }

    /// Server-wide permission requirements.
    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Town name rules.
    pub fn town_names(&self) -> &TownNameRules {
        &self.town_names
    }

    /// Whether claimants are written as soon as they change.
    pub fn save_on_mutation(&self) -> bool {
        self.save_on_mutation
    }

    /// Sends an event to the listener.
    pub fn notify(&self, event: ClaimEvent) {
        self.listener.notify(&event);
    }

    /// Writes `record`, logging instead of failing.
    ///
    /// Returns `false` when the write failed; the in-memory state stays
    /// authoritative and the caller keeps the claimant marked dirty.
    pub(crate) fn persist(&self, record: &ClaimantRecord) -> bool {
        match self.store.save(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("claimant {} not persisted: {err}", record.id);
                false
            }
        }
    }

    /// Deletes a record, logging instead of failing.
    pub(crate) fn forget(&self, record: &ClaimantRecord) {
        if let Err(err) = self.store.delete(record.kind(), record.id) {
            tracing::warn!("claimant {} not deleted from store: {err}", record.id);
        }
    }

    /// Writes `record` and surfaces the error.
    pub(crate) fn save(&self, record: &ClaimantRecord) -> Result<(), StoreError> {
        self.store.save(record)
    }
}
