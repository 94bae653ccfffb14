//! On-disk data: recordings and the contact list

mod contacts;
mod recordings;

#[cfg(test)]
pub use contacts::Contact;
pub use contacts::ContactList;
pub use recordings::{Recording, RecordingStore};
