//! User upload storage.
//!
//! Profile pictures and other user files live under `users/{user_id}/` with a
//! random file name. Links to them are signed and short-lived.

mod service;

pub use service::UserUploads;
