//! Method-signature strings.
//!
//! A signature is `"<name>@<argc>_<type1>_<type2>…"`, or `"<name>@0"` for a
//! zero-argument method. Type names are the provider's declared parameter
//! type names verbatim; the consumer and provider must agree on them for
//! exact-signature dispatch to succeed (name plus argument count is the
//! fallback).

/// Builds a signature string from a method name and its parameter type names.
pub fn build_sign(name: &str, param_types: &[&str]) -> String {
    let mut sign = format!("{}@{}", name, param_types.len());
    for ty in param_types {
        sign.push('_');
        sign.push_str(ty);
    }
    sign
}

/// Extracts the argument count from a signature string.
///
/// A string without an `@` separator (or with an unparsable count) is treated
/// as a zero-argument signature.
pub fn arg_count_of(sign: &str) -> usize {
    let Some((_, rest)) = sign.split_once('@') else {
        return 0;
    };
    let count = rest.split('_').next().unwrap_or("0");
    count.parse().unwrap_or(0)
}
