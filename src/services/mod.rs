//! View services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Each module shapes store documents into a view model for one page and
//! performs that page's writes through the caller's rule-checked store, so
//! route handlers stay focused on protocol translation and session plumbing.

pub mod announcements;
pub mod audit;
pub mod header;
pub mod home;
pub mod processes;
pub mod registration;
pub mod users;
