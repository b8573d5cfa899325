//! Per-app settings: compiled-in defaults deep-merged with the JSON blob an
//! operator can store at `/skiff/apps/<name>/settings`. Remote values win.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub cluster: ClusterSettings,
    pub log_group: LogGroupSettings,
    pub parameter_store: ParameterStoreSettings,
    pub codebuild_project: CodebuildSettings,
    pub shell: ShellSettings,
    pub db_utils: DbUtilsSettings,
    #[serde(default)]
    pub tags: Vec<ResourceTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogGroupSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterStoreSettings {
    pub prefix: String,
    /// When set, keys are stored lowercase and displayed uppercase, matching
    /// chamber's convention.
    #[serde(default)]
    pub chamber_compatible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebuildSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSettings {
    pub task_family: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbUtilsSettings {
    pub shell_task_family: String,
    pub dumpload_task_family: String,
    pub s3_bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTag {
    pub key: String,
    pub value: String,
}

impl Settings {
    /// The resource names a freshly created app gets when no settings blob
    /// overrides them.
    pub fn defaults_for(name: &str) -> Self {
        Self {
            cluster: ClusterSettings { name: name.into() },
            log_group: LogGroupSettings { name: name.into() },
            parameter_store: ParameterStoreSettings {
                prefix: format!("/{name}"),
                chamber_compatible: false,
            },
            codebuild_project: CodebuildSettings { name: name.into() },
            shell: ShellSettings {
                task_family: format!("{name}-shell"),
                command: "bash -l".into(),
            },
            db_utils: DbUtilsSettings {
                shell_task_family: format!("{name}-dbutils-shell"),
                dumpload_task_family: format!("{name}-dbutils-dumpload"),
                s3_bucket: format!("{name}-dbutils"),
            },
            tags: Vec::new(),
        }
    }

    /// Merge a remote settings blob over the defaults for `name`. A partial
    /// blob only replaces the keys it names.
    pub fn merged(name: &str, remote: Option<Value>) -> Result<Self> {
        let mut base = serde_json::to_value(Self::defaults_for(name))?;
        if let Some(remote) = remote {
            deep_merge(&mut base, remote);
        }
        Ok(serde_json::from_value(base)?)
    }
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Is `expected` a subset of `tags`?
pub fn tags_match(tags: &[ResourceTag], expected: &[ResourceTag]) -> bool {
    expected.iter().all(|tag| tags.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tag(key: &str, value: &str) -> ResourceTag {
        ResourceTag {
            key: key.into(),
            value: value.into(),
        }
    }

    #[test]
    fn defaults_derive_from_app_name() {
        let s = Settings::defaults_for("myapp");
        assert_eq!(s.cluster.name, "myapp");
        assert_eq!(s.parameter_store.prefix, "/myapp");
        assert_eq!(s.shell.task_family, "myapp-shell");
        assert_eq!(s.db_utils.s3_bucket, "myapp-dbutils");
        assert!(!s.parameter_store.chamber_compatible);
    }

    #[test]
    fn remote_blob_overrides_defaults() {
        let remote = json!({
            "cluster": {"name": "shared"},
            "parameter_store": {"chamber_compatible": true},
            "tags": [{"key": "skiff:appName", "value": "myapp"}],
        });
        let s = Settings::merged("myapp", Some(remote)).unwrap();
        assert_eq!(s.cluster.name, "shared");
        // untouched keys keep their defaults
        assert_eq!(s.parameter_store.prefix, "/myapp");
        assert!(s.parameter_store.chamber_compatible);
        assert_eq!(s.tags, vec![tag("skiff:appName", "myapp")]);
    }

    #[test]
    fn merged_without_remote_equals_defaults() {
        let s = Settings::merged("myapp", None).unwrap();
        assert_eq!(s.shell.command, "bash -l");
    }

    #[test]
    fn tags_match_is_subset() {
        let tags = vec![tag("a", "1"), tag("b", "2")];
        assert!(tags_match(&tags, &[]));
        assert!(tags_match(&tags, &[tag("b", "2")]));
        assert!(!tags_match(&tags, &[tag("b", "3")]));
        assert!(!tags_match(&tags, &[tag("c", "1")]));
    }
}
