//! USB HID boot-protocol keyboard primitives.
//!
//! Input report layout (8 bytes):
//! ```text
//! Byte 0: Modifier keys (bitfield)
//! Byte 1: Reserved (0x00)
//! Byte 2-7: Up to 6 simultaneous key codes (USB HID usage codes)
//! ```
//!
//! LED output report layout (1 byte):
//! ```text
//! Bit 0 = Num Lock, Bit 1 = Caps Lock, Bit 2 = Scroll Lock,
//! Bit 3 = Compose,  Bit 4 = Kana
//! ```

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

#[cfg(unix)]
pub mod gadget;

#[cfg(test)]
mod tests;

/// Keyboard input report size in bytes.
pub const KEYBOARD_REPORT_SIZE: usize = 8;

/// A keyboard emulation channel.
///
/// `press` and `release` assert the held state of a key towards the host;
/// `led_on` returns the most recent LED state the host reported back. It is
/// callable repeatedly without side effects on the reported state.
pub trait KeyboardDevice {
    fn press(&mut self, key: LockKey) -> io::Result<()>;
    fn release(&mut self, key: LockKey) -> io::Result<()>;
    fn led_on(&mut self, key: LockKey) -> io::Result<bool>;
}

/// Lock keys with a host-controlled LED indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockKey {
    #[default]
    CapsLock,
    NumLock,
    ScrollLock,
}

impl LockKey {
    /// USB HID usage code on the Keyboard/Keypad page.
    pub const fn keycode(self) -> u8 {
        match self {
            LockKey::CapsLock => 0x39,
            LockKey::NumLock => 0x53,
            LockKey::ScrollLock => 0x47,
        }
    }

    /// Bit mask of the key's indicator inside the LED output report.
    pub const fn led_mask(self) -> u8 {
        match self {
            LockKey::NumLock => 0x01,
            LockKey::CapsLock => 0x02,
            LockKey::ScrollLock => 0x04,
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockKey::CapsLock => "Caps Lock",
            LockKey::NumLock => "Num Lock",
            LockKey::ScrollLock => "Scroll Lock",
        };
        f.write_str(name)
    }
}

/// Standard USB HID boot-protocol keyboard input report.
///
/// Tracks the currently held keys and serializes to the 8-byte wire format.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct KeyboardReport {
    /// Modifier key bitfield.
    pub modifier: u8,
    /// Reserved byte (always 0x00 per HID spec).
    pub reserved: u8,
    /// Up to 6 simultaneously pressed key codes.
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    /// Mark a key as held. Returns `false` if all six slots are occupied;
    /// pressing an already-held key is a no-op.
    pub fn press(&mut self, keycode: u8) -> bool {
        if self.keycodes.contains(&keycode) {
            return true;
        }
        match self.keycodes.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = keycode;
                true
            }
            None => false,
        }
    }

    /// Mark a key as released. Releasing an idle key is a no-op.
    pub fn release(&mut self, keycode: u8) {
        for slot in self.keycodes.iter_mut() {
            if *slot == keycode {
                *slot = 0;
            }
        }
    }

    /// Serialize into the 8-byte wire format.
    pub fn encode(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        buf[0] = self.modifier;
        buf[1] = self.reserved;
        buf[2..].copy_from_slice(&self.keycodes);
        buf
    }

    /// Returns `true` if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes.iter().all(|&k| k == 0)
    }
}

/// USB HID Report Descriptor for a standard boot-protocol keyboard.
///
/// Announces to the host:
///   - 8 modifier key bits (input)
///   - 1 reserved byte
///   - 5 LED indicators (output)
///   - 6 key code bytes (input)
pub const KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    //
    //   Modifier keys (8 bits)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    //   Reserved byte
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant) - padding
    //
    //   LED output (5 bits + 3 padding)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant) - padding
    //
    //   Key codes (6 bytes)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0xFF, //   Usage Maximum (255)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x00, //   Input (Data, Array)
    //
    0xC0, // End Collection
];
