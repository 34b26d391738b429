use super::fakes::{
    account, FakeSession, FakeStore, StoreCall, CONFIRM_PASSWORD_FIELD, NEW_PASSWORD_FIELD,
    OK_BUTTON, PROMPT_LABEL,
};
use crate::config::RotationOptions;
use crate::credential::{AccountLocks, AccountRef, Credential, CredentialStore, FileCredentialStore};
use crate::errors::{RotationStage, SapError};
use crate::rotation::{PasswordRotator, RotationOutcome, RotationProgress};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn rotator(store: Arc<FakeStore>) -> PasswordRotator {
    let options = RotationOptions {
        settle_after_confirm: Duration::ZERO,
        ..RotationOptions::default()
    };
    PasswordRotator::new(store, options)
}

#[test]
fn test_nyt_password_prompt_rotates_through_every_stage() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::password_prompt("Nyt password");

    let outcome = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap();

    let report = match outcome {
        RotationOutcome::Rotated(report) => report,
        other => panic!("Expected a rotation, got {other:?}"),
    };
    assert_eq!(
        report.progress,
        vec![
            RotationProgress::PromptDetected,
            RotationProgress::BackedUp,
            RotationProgress::Generated,
            RotationProgress::WrittenToUi,
            RotationProgress::Confirmed,
            RotationProgress::Persisted,
        ]
    );

    let new_password = session.text_of(NEW_PASSWORD_FIELD).unwrap();
    assert_eq!(new_password.len(), 17);
    assert_eq!(session.text_of(CONFIRM_PASSWORD_FIELD).unwrap(), new_password);
    assert!(report.masked_password.starts_with(&new_password[..3]));

    assert_eq!(
        store.writes(),
        vec![
            StoreCall::Backup("robot/opus".to_string()),
            StoreCall::Save("robot/opus".to_string(), new_password.clone()),
        ]
    );
}

#[test]
fn test_ui_is_written_before_ok_is_pressed() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::password_prompt("Nyt password");

    rotator(store)
        .rotate_if_prompted(&session, &account())
        .unwrap();

    let events = session.events();
    assert_eq!(events.len(), 3);
    assert!(events[0].starts_with(&format!("set:{NEW_PASSWORD_FIELD}=")));
    assert!(events[1].starts_with(&format!("set:{CONFIRM_PASSWORD_FIELD}=")));
    assert_eq!(events[2], format!("press:{OK_BUTTON}"));
}

#[test]
fn test_missing_prompt_is_a_noop() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::main_window();

    let outcome = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap();

    assert_eq!(outcome, RotationOutcome::NoPromptDetected);
    assert!(!outcome.rotated());
    assert!(store.calls().is_empty());
    assert!(session.events().is_empty());
}

#[test]
fn test_unrecognised_prompt_text_is_an_error_without_writes() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::password_prompt("Some other text");

    let result = rotator(store.clone()).rotate_if_prompted(&session, &account());

    match result {
        Err(SapError::UnexpectedPromptState { found }) => assert_eq!(found, "Some other text"),
        other => panic!("Expected UnexpectedPromptState, got {other:?}"),
    }
    assert!(store.calls().is_empty());
    assert!(session.events().is_empty());
}

#[test]
fn test_sentinel_match_is_case_sensitive() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::password_prompt("nyt password");

    let result = rotator(store.clone()).rotate_if_prompted(&session, &account());

    assert!(matches!(
        result,
        Err(SapError::UnexpectedPromptState { .. })
    ));
    assert!(store.writes().is_empty());
}

#[test]
fn test_failed_backup_stops_before_touching_the_ui() {
    let store = Arc::new(FakeStore {
        fail_backup: true,
        ..FakeStore::new()
    });
    let session = FakeSession::password_prompt("Nyt password");

    let err = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(RotationStage::BackingUp));
    assert!(session.events().is_empty());
    assert!(store.writes().is_empty());
}

#[test]
fn test_missing_password_field_fails_without_save() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::new("/app/con[0]/ses[0]")
        .with_element(PROMPT_LABEL, "Nyt password")
        .with_element(NEW_PASSWORD_FIELD, "")
        .with_element(OK_BUTTON, "");

    let err = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(RotationStage::WritingToUi));
    assert!(err.is_element_not_found());
    assert_eq!(
        store.writes(),
        vec![StoreCall::Backup("robot/opus".to_string())]
    );
}

#[test]
fn test_rejected_text_write_fails_without_save() {
    let store = Arc::new(FakeStore::new());
    let session = FakeSession::password_prompt("Nyt password").with_failing_element(
        CONFIRM_PASSWORD_FIELD,
        true,
        false,
    );

    let err = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(RotationStage::WritingToUi));
    assert!(!store
        .writes()
        .iter()
        .any(|c| matches!(c, StoreCall::Save(..))));
}

#[test]
fn test_failed_confirm_fails_without_save() {
    let store = Arc::new(FakeStore::new());
    let session =
        FakeSession::password_prompt("Nyt password").with_failing_element(OK_BUTTON, false, true);

    let err = rotator(store.clone())
        .rotate_if_prompted(&session, &account())
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(RotationStage::Confirming));
    assert_eq!(
        store.writes(),
        vec![StoreCall::Backup("robot/opus".to_string())]
    );
}

#[test]
fn test_failed_save_is_reported_as_persist_stage() {
    let store = Arc::new(FakeStore {
        fail_save: true,
        ..FakeStore::new()
    });
    let session = FakeSession::password_prompt("Nyt password");

    let err = rotator(store)
        .rotate_if_prompted(&session, &account())
        .unwrap_err();

    assert_eq!(err.failed_stage(), Some(RotationStage::Persisting));
    assert!(matches!(
        err,
        SapError::RotationFailed { ref source, .. } if matches!(**source, SapError::CredentialStore(_))
    ));
}

#[test]
fn test_successive_rotations_generate_different_passwords() {
    let store = Arc::new(FakeStore::new());
    let rotator = rotator(store.clone());

    let first = FakeSession::password_prompt("Nyt password");
    let second = FakeSession::password_prompt("Nyt password");
    rotator.rotate_if_prompted(&first, &account()).unwrap();
    rotator.rotate_if_prompted(&second, &account()).unwrap();

    assert_ne!(
        first.text_of(NEW_PASSWORD_FIELD),
        second.text_of(NEW_PASSWORD_FIELD)
    );
}

#[test]
fn test_account_lock_is_released_after_failure() {
    let store = Arc::new(FakeStore {
        fail_backup: true,
        ..FakeStore::new()
    });
    let locks = Arc::new(AccountLocks::new());
    let rotator = rotator(store).with_locks(locks.clone());
    let session = FakeSession::password_prompt("Nyt password");

    assert!(rotator.rotate_if_prompted(&session, &account()).is_err());
    assert!(!locks.is_locked(&account()));
}

#[test]
fn test_rotation_waits_for_account_held_by_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let account = AccountRef::new(dir.path().join("robot.json"), "robot", "opus");
    let store = FileCredentialStore::new();
    store
        .provision(&account, &Credential::new("RPA_ROBOT", "old-secret"))
        .unwrap();

    // A separate rotator has its own in-process locks, like a second CLI run.
    let held = store.lock_account(&account).unwrap().unwrap();
    let rotator = PasswordRotator::new(
        Arc::new(store),
        RotationOptions {
            settle_after_confirm: Duration::ZERO,
            ..RotationOptions::default()
        },
    );

    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let account = account.clone();
        let done = done.clone();
        thread::spawn(move || {
            let session = FakeSession::password_prompt("Nyt password");
            let outcome = rotator.rotate_if_prompted(&session, &account).unwrap();
            done.store(outcome.rotated(), Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::SeqCst));
    assert_eq!(store.backup_count(&account).unwrap(), 0);

    drop(held);
    handle.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(store.backup_count(&account).unwrap(), 1);
    assert_ne!(store.get(&account).unwrap().password, "old-secret");
}

#[test]
fn test_custom_layout_is_honoured() {
    let store = Arc::new(FakeStore::new());
    let mut options = RotationOptions {
        settle_after_confirm: Duration::ZERO,
        ..RotationOptions::default()
    };
    options.layout.sentinel = "New password".to_string();
    let session = FakeSession::password_prompt("New password");

    let outcome = PasswordRotator::new(store, options)
        .rotate_if_prompted(&session, &account())
        .unwrap();

    assert!(outcome.rotated());
}
