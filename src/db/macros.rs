//! Parameter list macro.

/// Build a parameter list from heterogeneous values.
///
/// Each value goes through `SqlValue::from`, so `&str`, `String`, integers,
/// floats, `bool`, `Vec<u8>` and `Option` of those are accepted.
///
/// # Example
///
/// ```ignore
/// template.execute_update(
///     "insert into users (account, password, email) values (?, ?, ?)",
///     &sql_params!["jojo", "1234", None::<String>],
/// )?;
/// ```
#[macro_export]
macro_rules! sql_params {
    () => {
        ::std::vec::Vec::<$crate::db::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::db::SqlValue::from($value)),+]
    };
}
