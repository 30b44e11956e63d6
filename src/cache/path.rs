use std::env;
use std::path::PathBuf;

pub const STORE_FILE_NAME: &str = "conjure_store.json";
pub const STORE_ENV: &str = "CONJURE_STORE";

/// `CONJURE_STORE` when set, else `conjure_store.json` in the working directory.
pub fn default_store_path() -> PathBuf {
    store_path_from(env::var_os(STORE_ENV).map(PathBuf::from))
}

pub(crate) fn store_path_from(override_path: Option<PathBuf>) -> PathBuf {
    override_path
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(STORE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_relative_store_file() {
        assert_eq!(store_path_from(None), PathBuf::from("conjure_store.json"));
        assert_eq!(store_path_from(Some(PathBuf::new())), PathBuf::from("conjure_store.json"));
        assert_eq!(
            store_path_from(Some(PathBuf::from("/tmp/custom.json"))),
            PathBuf::from("/tmp/custom.json")
        );
    }
}
