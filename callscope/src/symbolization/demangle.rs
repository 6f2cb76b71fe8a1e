use rustc_demangle::demangle;

/// Demangle a Rust symbol name for display; other names pass through.
///
/// The hash suffix (`::h0123abcd...`) is dropped.
#[must_use]
pub fn demangle_symbol(symbol: &str) -> String {
    format!("{:#}", demangle(symbol))
}
