//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Text processing**: markup stripping, encoding repair, and description
//!   cleaning for feed content
//! - **Date normalization**: parsing heterogeneous feed dates into relative
//!   display strings and ISO timestamps
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use newsrack::util::{clean_description, normalize_date, repair_text};
//!
//! // Repair mis-encoded feed text
//! let fixed = repair_text("one\u{e2}s book"); // "one's book"
//!
//! // Clean a raw description for display
//! let short = clean_description("<p>Hands-on with the new hardware</p>");
//!
//! // Normalize a publication date
//! let stamp = normalize_date("Mon, 15 Jan 2024 10:30:00 GMT", Utc::now());
//! ```

mod dates;
mod text;

pub use dates::{normalize_date, DateStamp};
pub use text::{clean_description, repair_text, strip_markup};
