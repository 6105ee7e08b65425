// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

pub mod keys;
pub mod object_key;
pub mod scroll_cursor;
pub mod ssl_mode;

pub use keys::{IdentityKey, RecipientKey, SymKey};
pub use object_key::ObjectKey;
pub use scroll_cursor::ScrollCursor;
pub use ssl_mode::SslMode;
