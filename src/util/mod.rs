//! Utility functions for common operations.
//!
//! - **URL validation**: checks the admin API base URL before any key is sent to it
//! - **Text processing**: strips terminal escapes from server-provided labels
//!
//! # Examples
//!
//! ```
//! use proxydash::util::{sanitize_label, validate_base_url};
//!
//! let url = validate_base_url("http://localhost:3000").unwrap();
//! assert_eq!(url.port(), Some(3000));
//!
//! assert_eq!(sanitize_label("primary\x1b[31m relay"), "primary relay");
//! ```

mod text;
mod url_validator;

pub use text::sanitize_label;
pub use url_validator::{validate_base_url, UrlValidationError};
