//! Rotating the password of an SAP account when SAP asks for a new one.
//!
//! The sequence is: detect the prompt, back up the stored credential, generate
//! a new password, type it into both password fields, press OK, and only then
//! save the new password. If anything after the backup fails, the error names
//! the stage and the store still holds the old, working password.

use crate::config::RotationOptions;
use crate::credential::{AccountLocks, AccountRef, CredentialStore};
use crate::errors::{RotationStage, SapError};
use crate::password::{generate_password, PASSWORD_LENGTH};
use crate::scripting::GuiSession;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, instrument, warn};

/// Milestones of a successful rotation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationProgress {
    PromptDetected,
    BackedUp,
    Generated,
    WrittenToUi,
    Confirmed,
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub account: AccountRef,
    /// Milestones reached, ending with [`RotationProgress::Persisted`].
    pub progress: Vec<RotationProgress>,
    /// First three characters of the new password followed by `***`.
    pub masked_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// SAP did not ask for a new password.
    NoPromptDetected,
    Rotated(RotationReport),
}

impl RotationOutcome {
    pub fn rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated(_))
    }
}

/// Runs the password-change sequence against a session.
///
/// Clones share one [`AccountLocks`] registry, so two rotations of the same
/// `(user, system)` never interleave while different accounts run freely.
/// The store's own account lock extends this to other processes.
#[derive(Clone)]
pub struct PasswordRotator {
    store: Arc<dyn CredentialStore>,
    locks: Arc<AccountLocks>,
    options: RotationOptions,
}

impl PasswordRotator {
    pub fn new(store: Arc<dyn CredentialStore>, options: RotationOptions) -> Self {
        Self {
            store,
            locks: Arc::new(AccountLocks::new()),
            options,
        }
    }

    pub fn with_locks(mut self, locks: Arc<AccountLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn options(&self) -> &RotationOptions {
        &self.options
    }

    /// Changes the password of `account` if `session` shows the change-password prompt.
    ///
    /// Returns [`RotationOutcome::NoPromptDetected`] without touching the store
    /// when the prompt label is absent. A prompt label with any text other than
    /// the configured sentinel is [`SapError::UnexpectedPromptState`].
    #[instrument(skip(self, session), fields(account = %account))]
    pub fn rotate_if_prompted(
        &self,
        session: &dyn GuiSession,
        account: &AccountRef,
    ) -> Result<RotationOutcome, SapError> {
        let layout = &self.options.layout;

        let label = match session.find_by_id(&layout.prompt_label) {
            Ok(label) => label,
            Err(SapError::ElementNotFound(_)) => {
                debug!("No password prompt on {}", session.id());
                return Ok(RotationOutcome::NoPromptDetected);
            }
            Err(e) => return Err(e),
        };

        let text = label.text()?;
        if text != layout.sentinel {
            warn!("Password prompt label has unexpected text {:?}", text);
            return Err(SapError::UnexpectedPromptState { found: text });
        }
        info!("Password change required for {}", account);

        let _lock = self.locks.lock(account);
        let _store_lock = self
            .store
            .lock_account(account)
            .map_err(|e| e.at_stage(RotationStage::BackingUp))?;
        let mut progress = vec![RotationProgress::PromptDetected];

        self.store
            .backup(account)
            .map_err(|e| e.at_stage(RotationStage::BackingUp))?;
        progress.push(RotationProgress::BackedUp);
        info!("Backup of old password saved");

        let new_password = generate_password(PASSWORD_LENGTH);
        progress.push(RotationProgress::Generated);

        for field in [&layout.new_password_field, &layout.confirm_password_field] {
            session
                .find_by_id(field)
                .and_then(|element| element.set_text(new_password.expose()))
                .map_err(|e| e.at_stage(RotationStage::WritingToUi))?;
        }
        progress.push(RotationProgress::WrittenToUi);

        session
            .find_by_id(&layout.ok_button)
            .and_then(|button| button.press())
            .map_err(|e| e.at_stage(RotationStage::Confirming))?;
        progress.push(RotationProgress::Confirmed);

        if !self.options.settle_after_confirm.is_zero() {
            thread::sleep(self.options.settle_after_confirm);
        }

        self.store
            .save(account, new_password.expose())
            .map_err(|e| e.at_stage(RotationStage::Persisting))?;
        progress.push(RotationProgress::Persisted);
        info!("New password saved: {}", new_password.masked());

        Ok(RotationOutcome::Rotated(RotationReport {
            account: account.clone(),
            progress,
            masked_password: new_password.masked(),
        }))
    }
}

impl std::fmt::Debug for PasswordRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordRotator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
