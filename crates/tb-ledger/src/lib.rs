//! In-process entity store for the billing ledger.
//!
//! Implements the contract the domain core expects from its persistence
//! boundary: arenas of entities, ownership-free tag link records,
//! uniqueness enforcement on natural keys, cascade-or-refuse deletes, and
//! lifecycle operations guarded by optimistic version checks. Mutations
//! validate everything before touching the arenas, so every operation is
//! all-or-nothing.
//!
//! # Thread Safety
//!
//! [`Ledger`] takes `&mut self` for mutations and `&self` for reads; a
//! read therefore always observes one consistent snapshot. For
//! multi-threaded access wrap the ledger in a `Mutex` — the per-entry
//! `expected_version` checks then turn lost-update races (a stale stop or
//! mark-paid) into [`LedgerError::StaleVersion`] instead of silent
//! corruption.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tb_core::billing::{AllocationError, BillingLine, BillingReport, BillingWindow};
use tb_core::entry::{LifecycleError, TimeEntry};
use tb_core::favorite::Favorite;
use tb_core::money::{
    CurrencyCode, CurrencyError, RateProvider, Settings, convert, round_money,
};
use tb_core::project::{BillingScheme, Client, Project};
use tb_core::tag::Tag;
use tb_core::types::{
    ClientId, EntryId, FavoriteId, ProjectId, TagId, ValidationError,
};

/// Ledger operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No entity with the given id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique-key collision on create.
    #[error("{entity} already exists with {key} {value:?}")]
    DuplicateKey {
        entity: &'static str,
        key: &'static str,
        value: String,
    },

    /// The configured running policy forbids another concurrent entry.
    #[error("entry {entry} is already running on project {project}")]
    AlreadyRunning { entry: EntryId, project: ProjectId },

    /// Optimistic version check failed: the entry changed since it was read.
    #[error("entry {entry} changed concurrently: expected version {expected}, found {found}")]
    StaleVersion {
        entry: EntryId,
        expected: u64,
        found: u64,
    },

    /// A client cannot be deleted while projects reference it.
    #[error("client {client} still owns {projects} project(s)")]
    ClientHasProjects { client: ClientId, projects: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Currency(#[from] CurrencyError),
}

/// Which concurrently running entries [`Ledger::start_entry`] admits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningPolicy {
    /// Any number of running entries. Default.
    #[default]
    AllowMultiple,
    /// At most one running entry per project.
    SinglePerProject,
    /// At most one running entry across the whole ledger.
    SingleGlobal,
}

/// Ledger behavior configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub running_policy: RunningPolicy,
}

/// Partial update of a time entry. `None` leaves a field untouched.
///
/// Interval edits (`start_at`/`end_at`) are rejected on a running entry;
/// `tags`, when present, replaces the entry's whole tag set.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub description: Option<String>,
    pub project_id: Option<ProjectId>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub billable: Option<bool>,
    pub tags: Option<Vec<TagId>>,
    /// Optimistic check against the entry's current version.
    pub expected_version: Option<u64>,
}

/// Composable entry query; criteria are ANDed.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub project_id: Option<ProjectId>,
    /// Overlap filter; a running entry counts as extending to the window end.
    pub window: Option<BillingWindow>,
    pub tag_id: Option<TagId>,
    pub paid: Option<bool>,
    pub running: Option<bool>,
}

/// How an instantiated favorite enters the lifecycle.
#[derive(Debug, Clone, Copy)]
pub enum StartMode {
    /// Create a running entry starting at the given instant.
    Start { at: DateTime<Utc> },
    /// Log a stopped interval directly.
    Log {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
}

/// A billing report normalized to the display currency.
///
/// Per-line amounts and totals are converted from the project currency and
/// rounded to the settings' precision. Totals are converted at full
/// precision before rounding, so they can differ from the sum of rounded
/// lines by sub-precision remainders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingStatement {
    pub lines: Vec<BillingLine>,
    pub total: Decimal,
    pub collected: Decimal,
    pub outstanding: Decimal,
    pub in_progress: usize,
    pub currency: CurrencyCode,
}

/// The entity store.
///
/// Entities live in arenas keyed by id; tag associations are ownership-free
/// link records, so tags can be renamed or deleted independently of the
/// entries and favorites referencing them.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: LedgerConfig,
    settings: Settings,
    clients: HashMap<ClientId, Client>,
    projects: HashMap<ProjectId, Project>,
    entries: HashMap<EntryId, TimeEntry>,
    tags: HashMap<TagId, Tag>,
    favorites: HashMap<FavoriteId, Favorite>,
    entry_tags: BTreeSet<(EntryId, TagId)>,
    favorite_tags: BTreeSet<(FavoriteId, TagId)>,
}

impl Ledger {
    /// Creates an empty ledger with the default configuration.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self::with_config(settings, LedgerConfig::default())
    }

    #[must_use]
    pub fn with_config(settings: Settings, config: LedgerConfig) -> Self {
        Self {
            config,
            settings,
            clients: HashMap::new(),
            projects: HashMap::new(),
            entries: HashMap::new(),
            tags: HashMap::new(),
            favorites: HashMap::new(),
            entry_tags: BTreeSet::new(),
            favorite_tags: BTreeSet::new(),
        }
    }

    // ----- settings -----

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replaces the settings singleton whole.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    // ----- clients -----

    pub fn client(&self, id: &ClientId) -> Result<&Client, LedgerError> {
        self.clients.get(id).ok_or_else(|| LedgerError::NotFound {
            entity: "client",
            id: id.to_string(),
        })
    }

    pub fn find_client(&self, name: &str) -> Option<&Client> {
        self.clients.values().find(|c| c.name == name)
    }

    /// Creates a client; a colliding name is a conflict.
    pub fn create_client(
        &mut self,
        name: impl Into<String>,
        default_currency: CurrencyCode,
    ) -> Result<Client, LedgerError> {
        let name = name.into();
        if self.find_client(&name).is_some() {
            return Err(LedgerError::DuplicateKey {
                entity: "client",
                key: "name",
                value: name,
            });
        }
        let client = Client::new(ClientId::generate(), name, default_currency)?;
        self.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    /// Creates a client or updates the existing one with the same name.
    pub fn upsert_client(
        &mut self,
        name: impl Into<String>,
        default_currency: CurrencyCode,
    ) -> Result<Client, LedgerError> {
        let name = name.into();
        if let Some(client) = self.clients.values_mut().find(|c| c.name == name) {
            client.default_currency = default_currency;
            return Ok(client.clone());
        }
        self.create_client(name, default_currency)
    }

    /// Deletes a client; refused while projects reference it.
    pub fn delete_client(&mut self, id: &ClientId) -> Result<(), LedgerError> {
        self.client(id)?;
        let projects = self.projects.values().filter(|p| &p.client_id == id).count();
        if projects > 0 {
            return Err(LedgerError::ClientHasProjects {
                client: id.clone(),
                projects,
            });
        }
        self.clients.remove(id);
        Ok(())
    }

    pub fn clients(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        clients
    }

    // ----- projects -----

    pub fn project(&self, id: &ProjectId) -> Result<&Project, LedgerError> {
        self.projects.get(id).ok_or_else(|| LedgerError::NotFound {
            entity: "project",
            id: id.to_string(),
        })
    }

    pub fn find_project(&self, client_id: &ClientId, name: &str) -> Option<&Project> {
        self.projects
            .values()
            .find(|p| &p.client_id == client_id && p.name == name)
    }

    /// Creates a project; `(client, name)` must be unique.
    pub fn create_project(
        &mut self,
        client_id: &ClientId,
        name: impl Into<String>,
        currency: CurrencyCode,
        scheme: BillingScheme,
    ) -> Result<Project, LedgerError> {
        let name = name.into();
        self.client(client_id)?;
        if self.find_project(client_id, &name).is_some() {
            return Err(LedgerError::DuplicateKey {
                entity: "project",
                key: "(client, name)",
                value: name,
            });
        }
        let project = Project::new(
            ProjectId::generate(),
            client_id.clone(),
            name,
            currency,
            scheme,
        )?;
        self.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    /// Creates a project or updates the currency and scheme of the
    /// existing one with the same `(client, name)` key.
    pub fn upsert_project(
        &mut self,
        client_id: &ClientId,
        name: impl Into<String>,
        currency: CurrencyCode,
        scheme: BillingScheme,
    ) -> Result<Project, LedgerError> {
        let name = name.into();
        if let Some(project) = self
            .projects
            .values_mut()
            .find(|p| &p.client_id == client_id && p.name == name)
        {
            project.currency = currency;
            project.scheme = scheme;
            return Ok(project.clone());
        }
        self.create_project(client_id, name, currency, scheme)
    }

    /// Deletes a project and cascades to its entries, favorites, and
    /// their tag links. Tags themselves survive.
    pub fn delete_project(&mut self, id: &ProjectId) -> Result<(), LedgerError> {
        self.project(id)?;

        let entry_ids: BTreeSet<EntryId> = self
            .entries
            .values()
            .filter(|e| &e.project_id == id)
            .map(|e| e.id.clone())
            .collect();
        let favorite_ids: BTreeSet<FavoriteId> = self
            .favorites
            .values()
            .filter(|f| &f.project_id == id)
            .map(|f| f.id.clone())
            .collect();

        self.entries.retain(|_, e| &e.project_id != id);
        self.favorites.retain(|_, f| &f.project_id != id);
        self.entry_tags.retain(|(e, _)| !entry_ids.contains(e));
        self.favorite_tags.retain(|(f, _)| !favorite_ids.contains(f));
        self.projects.remove(id);

        tracing::debug!(
            project = %id,
            entries = entry_ids.len(),
            favorites = favorite_ids.len(),
            "project deleted with dependents"
        );
        Ok(())
    }

    /// Projects owned by a client, ordered by name.
    pub fn projects_by_client(&self, client_id: &ClientId) -> Vec<&Project> {
        let mut projects: Vec<&Project> = self
            .projects
            .values()
            .filter(|p| &p.client_id == client_id)
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        projects
    }

    // ----- tags -----

    pub fn tag(&self, id: &TagId) -> Result<&Tag, LedgerError> {
        self.tags.get(id).ok_or_else(|| LedgerError::NotFound {
            entity: "tag",
            id: id.to_string(),
        })
    }

    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.values().find(|t| t.name == name)
    }

    pub fn create_tag(&mut self, name: impl Into<String>) -> Result<Tag, LedgerError> {
        let name = name.into();
        if self.find_tag(&name).is_some() {
            return Err(LedgerError::DuplicateKey {
                entity: "tag",
                key: "name",
                value: name,
            });
        }
        let tag = Tag::new(TagId::generate(), name)?;
        self.tags.insert(tag.id.clone(), tag.clone());
        Ok(tag)
    }

    /// Returns the existing tag with this name or creates it.
    pub fn upsert_tag(&mut self, name: impl Into<String>) -> Result<Tag, LedgerError> {
        let name = name.into();
        if let Some(tag) = self.find_tag(&name) {
            return Ok(tag.clone());
        }
        self.create_tag(name)
    }

    /// Renames a tag; entries and favorites keep their associations.
    pub fn rename_tag(&mut self, id: &TagId, name: impl Into<String>) -> Result<Tag, LedgerError> {
        let name = name.into();
        self.tag(id)?;
        if self.find_tag(&name).is_some_and(|t| &t.id != id) {
            return Err(LedgerError::DuplicateKey {
                entity: "tag",
                key: "name",
                value: name,
            });
        }
        let tag = Tag::new(id.clone(), name)?;
        self.tags.insert(id.clone(), tag.clone());
        Ok(tag)
    }

    /// Deletes a tag and its link records; entries and favorites survive.
    pub fn delete_tag(&mut self, id: &TagId) -> Result<(), LedgerError> {
        self.tag(id)?;
        self.tags.remove(id);
        self.entry_tags.retain(|(_, t)| t != id);
        self.favorite_tags.retain(|(_, t)| t != id);
        Ok(())
    }

    pub fn tags(&self) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self.tags.values().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    fn require_tags(&self, tags: &[TagId]) -> Result<(), LedgerError> {
        for tag in tags {
            self.tag(tag)?;
        }
        Ok(())
    }

    // ----- favorites -----

    pub fn favorite(&self, id: &FavoriteId) -> Result<&Favorite, LedgerError> {
        self.favorites.get(id).ok_or_else(|| LedgerError::NotFound {
            entity: "favorite",
            id: id.to_string(),
        })
    }

    pub fn find_favorite(&self, project_id: &ProjectId, name: &str) -> Option<&Favorite> {
        self.favorites
            .values()
            .find(|f| &f.project_id == project_id && f.name == name)
    }

    /// Creates a favorite; `(project, name)` must be unique.
    pub fn create_favorite(
        &mut self,
        project_id: &ProjectId,
        name: impl Into<String>,
        description_template: impl Into<String>,
        default_billable: bool,
        tags: &[TagId],
    ) -> Result<Favorite, LedgerError> {
        let name = name.into();
        self.project(project_id)?;
        self.require_tags(tags)?;
        if self.find_favorite(project_id, &name).is_some() {
            return Err(LedgerError::DuplicateKey {
                entity: "favorite",
                key: "(project, name)",
                value: name,
            });
        }
        let favorite = Favorite::new(
            FavoriteId::generate(),
            project_id.clone(),
            name,
            description_template,
            default_billable,
        )?;
        for tag in tags {
            self.favorite_tags.insert((favorite.id.clone(), tag.clone()));
        }
        self.favorites.insert(favorite.id.clone(), favorite.clone());
        Ok(favorite)
    }

    /// Creates a favorite or updates the template, billable default, and
    /// tag set of the existing one with the same `(project, name)` key.
    pub fn upsert_favorite(
        &mut self,
        project_id: &ProjectId,
        name: impl Into<String>,
        description_template: impl Into<String>,
        default_billable: bool,
        tags: &[TagId],
    ) -> Result<Favorite, LedgerError> {
        let name = name.into();
        self.require_tags(tags)?;
        if let Some(favorite) = self
            .favorites
            .values_mut()
            .find(|f| &f.project_id == project_id && f.name == name)
        {
            favorite.description_template = description_template.into();
            favorite.default_billable = default_billable;
            let favorite = favorite.clone();
            self.favorite_tags.retain(|(f, _)| f != &favorite.id);
            for tag in tags {
                self.favorite_tags.insert((favorite.id.clone(), tag.clone()));
            }
            return Ok(favorite);
        }
        self.create_favorite(project_id, name, description_template, default_billable, tags)
    }

    pub fn delete_favorite(&mut self, id: &FavoriteId) -> Result<(), LedgerError> {
        self.favorite(id)?;
        self.favorites.remove(id);
        self.favorite_tags.retain(|(f, _)| f != id);
        Ok(())
    }

    /// Tags attached to a favorite, ordered by name.
    pub fn favorite_tags(&self, id: &FavoriteId) -> Result<Vec<&Tag>, LedgerError> {
        self.favorite(id)?;
        let mut tags: Vec<&Tag> = self
            .favorite_tags
            .iter()
            .filter(|(f, _)| f == id)
            .filter_map(|(_, t)| self.tags.get(t))
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Creates a new time entry from a favorite.
    ///
    /// Resolves the description template against `values`, copies the
    /// favorite's tag set and billable default, and enters the lifecycle
    /// per `mode`.
    pub fn instantiate_favorite(
        &mut self,
        id: &FavoriteId,
        values: &HashMap<String, String>,
        mode: StartMode,
    ) -> Result<TimeEntry, LedgerError> {
        let favorite = self.favorite(id)?.clone();
        let description = favorite.render(values)?;
        let tags: Vec<TagId> = self
            .favorite_tags
            .iter()
            .filter(|(f, _)| f == id)
            .map(|(_, t)| t.clone())
            .collect();

        let entry = match mode {
            StartMode::Start { at } => {
                self.check_running_policy(&favorite.project_id)?;
                TimeEntry::start(
                    EntryId::generate(),
                    favorite.project_id.clone(),
                    description,
                    at,
                )
            }
            StartMode::Log { start_at, end_at } => TimeEntry::log(
                EntryId::generate(),
                favorite.project_id.clone(),
                description,
                start_at,
                end_at,
            )?,
        }
        .with_billable(favorite.default_billable);

        tracing::debug!(favorite = %favorite.id, entry = %entry.id, "favorite instantiated");
        Ok(self.insert_entry(entry, &tags))
    }

    // ----- time entries -----

    pub fn entry(&self, id: &EntryId) -> Result<&TimeEntry, LedgerError> {
        self.entries.get(id).ok_or_else(|| LedgerError::NotFound {
            entity: "time entry",
            id: id.to_string(),
        })
    }

    fn insert_entry(&mut self, entry: TimeEntry, tags: &[TagId]) -> TimeEntry {
        for tag in tags {
            self.entry_tags.insert((entry.id.clone(), tag.clone()));
        }
        self.entries.insert(entry.id.clone(), entry.clone());
        entry
    }

    fn check_running_policy(&self, project_id: &ProjectId) -> Result<(), LedgerError> {
        let conflicting = match self.config.running_policy {
            RunningPolicy::AllowMultiple => None,
            RunningPolicy::SinglePerProject => self
                .entries
                .values()
                .find(|e| e.is_running() && &e.project_id == project_id),
            RunningPolicy::SingleGlobal => self.entries.values().find(|e| e.is_running()),
        };
        match conflicting {
            Some(existing) => Err(LedgerError::AlreadyRunning {
                entry: existing.id.clone(),
                project: existing.project_id.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Starts a running entry at `at`, subject to the running policy.
    pub fn start_entry(
        &mut self,
        project_id: &ProjectId,
        description: impl Into<String>,
        tags: &[TagId],
        at: DateTime<Utc>,
    ) -> Result<TimeEntry, LedgerError> {
        self.project(project_id)?;
        self.require_tags(tags)?;
        self.check_running_policy(project_id)?;
        let entry = TimeEntry::start(EntryId::generate(), project_id.clone(), description, at);
        tracing::debug!(entry = %entry.id, project = %project_id, "entry started");
        Ok(self.insert_entry(entry, tags))
    }

    /// Logs a stopped interval directly.
    pub fn log_entry(
        &mut self,
        project_id: &ProjectId,
        description: impl Into<String>,
        tags: &[TagId],
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<TimeEntry, LedgerError> {
        self.project(project_id)?;
        self.require_tags(tags)?;
        let entry = TimeEntry::log(
            EntryId::generate(),
            project_id.clone(),
            description,
            start_at,
            end_at,
        )?;
        Ok(self.insert_entry(entry, tags))
    }

    fn entry_mut(
        &mut self,
        id: &EntryId,
        expected_version: Option<u64>,
    ) -> Result<&mut TimeEntry, LedgerError> {
        let entry = self.entries.get_mut(id).ok_or_else(|| LedgerError::NotFound {
            entity: "time entry",
            id: id.to_string(),
        })?;
        if let Some(expected) = expected_version {
            if entry.version() != expected {
                return Err(LedgerError::StaleVersion {
                    entry: id.clone(),
                    expected,
                    found: entry.version(),
                });
            }
        }
        Ok(entry)
    }

    /// Stops a running entry; a no-op on an already-stopped one.
    pub fn stop_entry(
        &mut self,
        id: &EntryId,
        at: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<TimeEntry, LedgerError> {
        let entry = self.entry_mut(id, expected_version)?;
        let transitioned = entry.stop(at)?;
        let entry = entry.clone();
        if transitioned {
            tracing::debug!(entry = %id, duration_secs = entry.duration_secs(), "entry stopped");
        } else {
            tracing::warn!(entry = %id, "stop on already-stopped entry ignored");
        }
        Ok(entry)
    }

    pub fn mark_entry_paid(
        &mut self,
        id: &EntryId,
        paid_at: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<TimeEntry, LedgerError> {
        let entry = self.entry_mut(id, expected_version)?;
        entry.mark_paid(paid_at)?;
        let entry = entry.clone();
        tracing::debug!(entry = %id, "entry marked paid");
        Ok(entry)
    }

    pub fn mark_entry_unpaid(
        &mut self,
        id: &EntryId,
        expected_version: Option<u64>,
    ) -> Result<TimeEntry, LedgerError> {
        let entry = self.entry_mut(id, expected_version)?;
        entry.mark_unpaid()?;
        let entry = entry.clone();
        tracing::debug!(entry = %id, "entry marked unpaid");
        Ok(entry)
    }

    /// Applies a partial update. Fails without mutating anything when any
    /// referenced entity is missing or a lifecycle rule is violated.
    pub fn edit_entry(&mut self, id: &EntryId, patch: EntryPatch) -> Result<TimeEntry, LedgerError> {
        if let Some(project_id) = &patch.project_id {
            self.project(project_id)?;
        }
        if let Some(tags) = &patch.tags {
            self.require_tags(tags)?;
        }

        let mut updated = self.entry(id)?.clone();
        if let Some(expected) = patch.expected_version {
            if updated.version() != expected {
                return Err(LedgerError::StaleVersion {
                    entry: id.clone(),
                    expected,
                    found: updated.version(),
                });
            }
        }

        if patch.start_at.is_some() || patch.end_at.is_some() {
            updated.reschedule(patch.start_at, patch.end_at)?;
        }
        if let Some(description) = patch.description {
            updated.set_description(description);
        }
        if let Some(project_id) = patch.project_id {
            updated.set_project(project_id);
        }
        if let Some(billable) = patch.billable {
            updated.set_billable(billable);
        }
        if let Some(tags) = &patch.tags {
            self.entry_tags.retain(|(e, _)| e != id);
            for tag in tags {
                self.entry_tags.insert((id.clone(), tag.clone()));
            }
        }
        self.entries.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    pub fn delete_entry(&mut self, id: &EntryId) -> Result<(), LedgerError> {
        self.entry(id)?;
        self.entries.remove(id);
        self.entry_tags.retain(|(e, _)| e != id);
        Ok(())
    }

    /// Attaches a tag to an entry; idempotent.
    pub fn tag_entry(&mut self, entry_id: &EntryId, tag_id: &TagId) -> Result<(), LedgerError> {
        self.entry(entry_id)?;
        self.tag(tag_id)?;
        self.entry_tags.insert((entry_id.clone(), tag_id.clone()));
        Ok(())
    }

    pub fn untag_entry(&mut self, entry_id: &EntryId, tag_id: &TagId) -> Result<(), LedgerError> {
        self.entry(entry_id)?;
        self.entry_tags.remove(&(entry_id.clone(), tag_id.clone()));
        Ok(())
    }

    /// Tags attached to an entry, ordered by name.
    pub fn entry_tags(&self, id: &EntryId) -> Result<Vec<&Tag>, LedgerError> {
        self.entry(id)?;
        let mut tags: Vec<&Tag> = self
            .entry_tags
            .iter()
            .filter(|(e, _)| e == id)
            .filter_map(|(_, t)| self.tags.get(t))
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Entries matching `filter`, ordered by start time then id.
    pub fn entries(&self, filter: &EntryFilter) -> Vec<&TimeEntry> {
        let mut entries: Vec<&TimeEntry> = self
            .entries
            .values()
            .filter(|e| self.matches(filter, e))
            .collect();
        entries.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    fn matches(&self, filter: &EntryFilter, entry: &TimeEntry) -> bool {
        if let Some(project_id) = &filter.project_id {
            if &entry.project_id != project_id {
                return false;
            }
        }
        if let Some(paid) = filter.paid {
            if entry.is_paid() != paid {
                return false;
            }
        }
        if let Some(running) = filter.running {
            if entry.is_running() != running {
                return false;
            }
        }
        if let Some(tag_id) = &filter.tag_id {
            if !self
                .entry_tags
                .contains(&(entry.id.clone(), tag_id.clone()))
            {
                return false;
            }
        }
        if let Some(window) = &filter.window {
            let end_at = entry.end_at().unwrap_or(window.end);
            if !window.admits(entry.start_at, end_at) {
                return false;
            }
        }
        true
    }

    // ----- billing -----

    /// Billable entries of a project, ordered by start time then id.
    fn billable_entries(&self, project_id: &ProjectId) -> Vec<TimeEntry> {
        let mut entries: Vec<TimeEntry> = self
            .entries
            .values()
            .filter(|e| &e.project_id == project_id && e.billable)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// Computes billing for a project in its own currency, full precision.
    ///
    /// Non-billable entries do not participate; running entries surface in
    /// the report's `in_progress` count.
    pub fn billing_report(
        &self,
        project_id: &ProjectId,
        window: Option<&BillingWindow>,
    ) -> Result<BillingReport, LedgerError> {
        let project = self.project(project_id)?;
        let entries = self.billable_entries(project_id);
        let report = tb_core::billing::compute_billing(
            &project.scheme,
            &entries,
            window,
            self.settings.money_precision,
        )?;
        Ok(report)
    }

    /// Computes billing normalized to the display currency.
    ///
    /// Rates are looked up at `as_of`; every amount is rounded to the
    /// settings' precision after conversion.
    pub fn billing_statement(
        &self,
        project_id: &ProjectId,
        window: Option<&BillingWindow>,
        rates: &dyn RateProvider,
        as_of: DateTime<Utc>,
    ) -> Result<BillingStatement, LedgerError> {
        let currency = self.project(project_id)?.currency.clone();
        let report = self.billing_report(project_id, window)?;
        let display = self.settings.display_currency.clone();
        let precision = self.settings.money_precision;

        let normalize = |amount: Decimal| -> Result<Decimal, CurrencyError> {
            convert(amount, &currency, &display, as_of, rates).map(|a| round_money(a, precision))
        };

        let mut lines = Vec::with_capacity(report.lines.len());
        for line in report.lines {
            lines.push(BillingLine {
                amount: line.amount.map(normalize).transpose()?,
                ..line
            });
        }

        Ok(BillingStatement {
            lines,
            total: normalize(report.total)?,
            collected: normalize(report.collected)?,
            outstanding: normalize(report.outstanding)?,
            in_progress: report.in_progress,
            currency: display,
        })
    }
}
