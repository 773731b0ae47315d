pub mod time;

/// Generates a url-safe unique id, used for message ids, etags and activity execution ids.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Registry key of a deployed workflow definition.
pub fn definition_key(
    name: &str,
    version: &str,
) -> String {
    format!("{}@{}", name, version)
}
