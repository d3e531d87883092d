use super::Exports;
use crate::{diagnostics::ErrorKind, value::Value};

/// The `error_type` module: one constant per error kind, plus `all`.
pub(crate) fn exports() -> Exports {
    let mut kinds = Exports::new();
    for kind in ErrorKind::ALL {
        kinds.insert(kind.name(), Value::str(kind.name()));
    }
    kinds.insert(
        "all",
        Value::list(
            ErrorKind::ALL
                .iter()
                .map(|kind| Value::str(kind.name()))
                .collect(),
        ),
    );
    kinds
}
