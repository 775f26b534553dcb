/// Lower-cases a single scalar value.
///
/// Code points whose lowercase expansion is not a single scalar value
/// (e.g. `İ`) are returned unchanged, so that folding is always a 1:1
/// mapping and comparing `to_lower` of both sides is well defined.
pub(crate) fn to_lower(ch: char) -> char {
    let mut it = ch.to_lowercase();
    match (it.next(), it.next()) {
        (Some(lower), None) => lower,
        _ => ch,
    }
}

/// Upper-cases a single scalar value, with the same 1:1 restriction as
/// [`to_lower`].
pub(crate) fn to_upper(ch: char) -> char {
    let mut it = ch.to_uppercase();
    match (it.next(), it.next()) {
        (Some(upper), None) => upper,
        _ => ch,
    }
}

/// Returns true if the given scalar value is a word character, that is,
/// alphanumeric or an underscore.
pub(crate) fn is_word(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}
