//! Contact list offered by the call menu

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::Digit;

/// A callable contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Name spoken in the menu
    pub name: String,
    /// Number or SIP URI handed to the call subsystem
    pub destination: String,
}

/// Ordered, read-only contact list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactList {
    contacts: Vec<Contact>,
}

impl ContactList {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    /// Load contacts from a JSON array.
    ///
    /// A missing or malformed file leaves the list empty; the device keeps
    /// working without the call menu entries.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(?path, error = %e, "contacts unavailable, call menu will be empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<Contact>>(&text) {
            Ok(contacts) => {
                info!(?path, count = contacts.len(), "contacts loaded");
                Self::new(contacts)
            }
            Err(e) => {
                warn!(?path, error = %e, "contacts file is malformed, call menu will be empty");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Menu entries as (digit to dial, contact). Only the first ten fit on
    /// the dial.
    pub fn entries(&self) -> impl Iterator<Item = (Digit, &Contact)> {
        self.contacts
            .iter()
            .take(10)
            .enumerate()
            .map(|(index, contact)| (Digit::from_pulses(index as u32 + 1), contact))
    }

    /// Contact selected by dialing `digit`; zero selects the tenth entry
    pub fn select(&self, digit: Digit) -> Option<&Contact> {
        let position = match digit.value() {
            0 => 10,
            n => n as usize,
        };
        self.contacts.get(position - 1)
    }
}
