// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules over the Reverie schema.

pub mod memories;
pub mod search;
pub mod sessions;
pub mod turns;

use std::str::FromStr;

use reverie_core::Role;

/// Parse a stored role column, surfacing bad values as a conversion error.
pub(crate) fn parse_role(idx: usize, value: &str) -> Result<Role, rusqlite::Error> {
    Role::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
