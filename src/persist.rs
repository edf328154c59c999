//! JSON persistence helpers for extensions.
//!
//! The core keeps no state on disk; these two helpers exist for plugins
//! that want to. Files live under `data/` as UTF-8 JSON with stable keys.

use crate::error::Error;
use serde_json::Value;
use std::path::PathBuf;

fn data_path(name: &str) -> PathBuf {
    PathBuf::from("data").join(format!("{}.json", name))
}

/// Write a JSON object under `data/<name>.json`, creating the directory.
pub fn write_data(name: &str, data: &Value) -> Result<(), Error> {
    let path = data_path(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(data)?)?;
    Ok(())
}

/// Read `data/<name>.json` back; an absent file is an empty object.
pub fn read_data(name: &str) -> Result<Value, Error> {
    let path = data_path(name);
    match std::fs::read_to_string(&path) {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Value::Object(Default::default()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let old = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let data = json!({ "seen": { "alice": 1700000000 } });
        write_data("testplugin", &data).unwrap();
        assert_eq!(read_data("testplugin").unwrap(), data);
        assert_eq!(read_data("missing").unwrap(), json!({}));

        std::env::set_current_dir(old).unwrap();
    }
}
