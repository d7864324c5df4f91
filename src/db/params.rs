//! Positional parameter binding.
//!
//! `params[i]` goes to slot `i + 1`. The number of parameters is not checked
//! against the placeholders in the SQL; a mismatch is reported by the driver
//! when binding or executing.

use crate::db::driver::PreparedStatement;
use crate::db::value::SqlValue;
use crate::error::{DataAccessError, DataAccessResult, Operation};

/// Bind every parameter to its 1-based slot, in order.
pub fn bind_parameters<P: PreparedStatement>(
    statement: &mut P,
    params: &[SqlValue],
) -> DataAccessResult<()> {
    for (slot, param) in (1..).zip(params) {
        statement
            .set_parameter(slot, param)
            .map_err(DataAccessError::at(Operation::BindParameter))?;
    }
    Ok(())
}
