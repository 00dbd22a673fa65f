//! Core domain logic for the billing ledger.
//!
//! This crate contains the fundamental types and logic for:
//! - Billing: computing what a project's time entries are worth
//! - Lifecycle: the running → stopped → paid time-entry state machine
//! - Money: currency codes, rounding, and rate-based conversion
//! - Aggregates: clients, projects, tags, and favorites

pub mod billing;
pub mod entry;
pub mod favorite;
pub mod money;
pub mod project;
pub mod tag;
pub mod types;

pub use billing::{
    AllocationError, BillingLine, BillingReport, BillingWindow, FixedAllocation, compute_billing,
};
pub use entry::{EntryState, LifecycleError, Payment, TimeEntry};
pub use favorite::{Favorite, render_template};
pub use money::{
    CurrencyCode, CurrencyError, FxTable, RateProvider, SETTINGS_ID, Settings, convert, round_money,
};
pub use project::{BillingScheme, Client, Project};
pub use tag::Tag;
pub use types::{ClientId, EntryId, FavoriteId, ProjectId, TagId, ValidationError};
