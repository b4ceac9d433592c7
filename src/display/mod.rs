//! Display control: hardware access, transactions, and the persisted registry
//!
//! Layering, leaves first:
//! - [`DisplayHardware`]: the OS display API (CoreGraphics/SkyLight on macOS)
//! - [`DisplayConfigTransactor`]: all-or-nothing batches of enable/disable changes
//! - [`DisplayRegistry`]: reconciles attached displays with the [`DisplayStore`]
//! - [`ReconnectAllRecovery`]: force-enables everything, ignoring the store
//!
//! [`DisplayStore`]: crate::store::DisplayStore

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(test)]
pub mod mock;
mod recovery;
mod registry;
mod transactor;

pub use recovery::ReconnectAllRecovery;
pub use registry::DisplayRegistry;
pub use transactor::{DisplayChange, DisplayConfigTransactor};

use crate::store::StoreError;

/// Opaque, stable hardware identifier (a `CGDirectDisplayID` on macOS)
pub type DisplayId = u32;

/// Raw status code returned by the OS display API (`CGError`)
pub type OsStatus = i32;

/// A display reported by hardware enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDisplay {
    pub id: DisplayId,
    pub name: String,
}

/// An open display-configuration transaction
///
/// Changes are staged until `commit`; `cancel` discards them. The handle is
/// not reentrant, so at most one may be open at a time.
pub trait ConfigTransaction {
    fn set_enabled(&mut self, id: DisplayId, enabled: bool) -> Result<(), OsStatus>;
    fn commit(&mut self) -> Result<(), OsStatus>;
    fn cancel(&mut self);
}

/// The OS display API
pub trait DisplayHardware: Send + Sync {
    fn begin_config(&self) -> Result<Box<dyn ConfigTransaction + '_>, OsStatus>;

    /// Displays currently attached and active, with user-facing names
    fn enumerate_attached(&self) -> Result<Vec<AttachedDisplay>, OsStatus>;

    /// Every display the window server knows about, including disabled ones
    fn enumerate_all(&self) -> Result<Vec<DisplayId>, OsStatus>;

    /// User-facing name of one display, active or not
    fn display_name(&self, id: DisplayId) -> String;

    /// The display containing the mouse pointer, if any
    fn display_under_pointer(&self) -> Option<DisplayId>;
}

/// Errors from display operations
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("failed to begin display configuration (CGError {0})")]
    TransactionBeginFailed(OsStatus),

    #[error("failed to configure display {display_id} (CGError {code})")]
    ApplyFailed { display_id: DisplayId, code: OsStatus },

    #[error("failed to complete display configuration (CGError {0})")]
    CommitFailed(OsStatus),

    #[error("failed to enumerate displays (CGError {0})")]
    EnumerationFailed(OsStatus),

    #[error("failed to register display reconfiguration callback (CGError {0})")]
    CallbackRegistration(OsStatus),

    #[error("display {0} is not known")]
    UnknownDisplay(DisplayId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("display task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DisplayError {
    /// Short machine-readable code for the control socket
    pub fn code(&self) -> &'static str {
        match self {
            DisplayError::TransactionBeginFailed(_) => "transaction_begin_failed",
            DisplayError::ApplyFailed { .. } => "apply_failed",
            DisplayError::CommitFailed(_) => "commit_failed",
            DisplayError::EnumerationFailed(_) => "enumeration_failed",
            DisplayError::CallbackRegistration(_) => "callback_registration_failed",
            DisplayError::UnknownDisplay(_) => "unknown_display",
            DisplayError::Store(_) => "store_error",
            DisplayError::Task(_) => "task_failed",
        }
    }
}
