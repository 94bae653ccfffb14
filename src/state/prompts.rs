//! Spoken prompts
//!
//! The phone has no screen, so every prompt and every complaint goes
//! through the speech synthesizer.

use crate::storage::ContactList;

use super::machine::MenuChoice;

pub const INVALID_SELECTION: &str = "That is not a valid selection.";
pub const NO_MESSAGES: &str = "There are no messages.";
pub const END_OF_MESSAGES: &str = "That was the last message.";
pub const NO_CONTACTS: &str = "There is no one to call.";
pub const CALLING_UNAVAILABLE: &str = "Calling is not available on this phone.";
pub const RECORDING_UNAVAILABLE: &str = "Sorry, recording is not working right now.";

/// Root menu, listing the digit for every choice
pub fn root_menu() -> String {
    format!(
        "To leave a message, dial {}. To hear messages, dial {}. To make a call, dial {}.",
        MenuChoice::Record.digit(),
        MenuChoice::Playback.digit(),
        MenuChoice::MakeCall.digit(),
    )
}

/// Contact menu, one sentence per contact
pub fn contact_menu(contacts: &ContactList) -> String {
    contacts
        .entries()
        .map(|(digit, contact)| format!("To call {}, dial {}.", contact.name, digit))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn calling(name: &str) -> String {
    format!("Calling {}.", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Contact;

    #[test]
    fn test_root_menu_lists_codes() {
        let menu = root_menu();
        assert!(menu.contains("dial 1"));
        assert!(menu.contains("dial 2"));
        assert!(menu.contains("dial 3"));
    }

    #[test]
    fn test_contact_menu() {
        let contacts = ContactList::new(vec![
            Contact {
                name: "Grandma".into(),
                destination: "5551234".into(),
            },
            Contact {
                name: "Office".into(),
                destination: "5559876".into(),
            },
        ]);
        assert_eq!(
            contact_menu(&contacts),
            "To call Grandma, dial 1. To call Office, dial 2."
        );
    }
}
