//! Unit tests for the boot-protocol keyboard report layer.
//!
//! These run on the host and cover the pure logic of report state
//! management, serialization, and the lock-key symbol tables.

use super::{KeyboardReport, LockKey, KEYBOARD_REPORT_DESCRIPTOR, KEYBOARD_REPORT_SIZE};

// ═══════════════════════════════════════════════════════════════════════════
// Keyboard Report Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn default_report_is_empty() {
    let report = KeyboardReport::default();
    assert!(report.is_empty());
    assert_eq!(report.encode(), [0u8; KEYBOARD_REPORT_SIZE]);
}

#[test]
fn press_occupies_first_free_slot() {
    let mut report = KeyboardReport::default();
    assert!(report.press(LockKey::CapsLock.keycode()));
    assert!(!report.is_empty());
    assert_eq!(
        report.encode(),
        [0x00, 0x00, 0x39, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn pressing_a_held_key_is_a_noop() {
    let mut report = KeyboardReport::default();
    assert!(report.press(0x39));
    assert!(report.press(0x39));
    let held: Vec<u8> = report.keycodes.iter().copied().filter(|&k| k != 0).collect();
    assert_eq!(held, vec![0x39]);
}

#[test]
fn seventh_simultaneous_key_is_refused() {
    let mut report = KeyboardReport::default();
    for keycode in 0x04..0x0A {
        assert!(report.press(keycode));
    }
    assert!(!report.press(0x0A));
}

#[test]
fn release_clears_the_key_slot() {
    let mut report = KeyboardReport::default();
    report.press(0x39);
    report.press(0x04);
    report.release(0x39);
    assert_eq!(
        report.encode(),
        [0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00]
    );
    report.release(0x04);
    assert!(report.is_empty());
}

#[test]
fn releasing_an_idle_key_is_a_noop() {
    let mut report = KeyboardReport::default();
    report.release(0x39);
    assert!(report.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Lock Key Symbol Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn lock_key_usage_codes() {
    assert_eq!(LockKey::CapsLock.keycode(), 0x39);
    assert_eq!(LockKey::NumLock.keycode(), 0x53);
    assert_eq!(LockKey::ScrollLock.keycode(), 0x47);
}

#[test]
fn lock_key_led_masks_are_distinct_bits() {
    assert_eq!(LockKey::NumLock.led_mask(), 0x01);
    assert_eq!(LockKey::CapsLock.led_mask(), 0x02);
    assert_eq!(LockKey::ScrollLock.led_mask(), 0x04);
}

#[test]
fn default_target_is_caps_lock() {
    assert_eq!(LockKey::default(), LockKey::CapsLock);
}

#[test]
fn lock_key_parses_from_configuration_strings() {
    let key: LockKey = serde_json::from_str("\"NumLock\"").unwrap();
    assert_eq!(key, LockKey::NumLock);
    assert!(serde_json::from_str::<LockKey>("\"WindowsKey\"").is_err());
}

// ═══════════════════════════════════════════════════════════════════════════
// Report Descriptor Tests
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn descriptor_is_a_keyboard_application_collection() {
    // Usage Page (Generic Desktop), Usage (Keyboard), closed collection.
    assert_eq!(KEYBOARD_REPORT_DESCRIPTOR[..4], [0x05, 0x01, 0x09, 0x06]);
    assert_eq!(*KEYBOARD_REPORT_DESCRIPTOR.last().unwrap(), 0xC0);
}

#[test]
fn descriptor_declares_led_output_page() {
    let has_led_page = KEYBOARD_REPORT_DESCRIPTOR
        .windows(2)
        .any(|pair| pair == [0x05, 0x08]);
    assert!(has_led_page);
}
