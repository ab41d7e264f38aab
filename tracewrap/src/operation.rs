/// Derive a span operation name from an HTTP method and path.
///
/// The path is collapsed to its first segment so operation names stay
/// low-cardinality: `GET /users/42/profile` becomes `GET /users`, and
/// `GET /` stays `GET /`.
pub fn operation_name(method: &str, path: &str) -> String {
    match path.split('/').nth(1) {
        Some(segment) if !segment.is_empty() => format!("{method} /{segment}"),
        _ => format!("{method} /"),
    }
}
