//! Bot instance provisioning from a template directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};

use aviary_core::write_text_atomic;

const INSTANCE_CONFIG_FILE: &str = "config.json";

/// Account and display fields written into a fresh instance's config file.
#[derive(Debug, Clone)]
pub struct BotProvisionSpec {
    pub account_uid: String,
    pub account_credential: String,
    pub name: String,
    pub display_name: String,
}

/// Produces independent, fully-populated instance directories for new bots
/// by copying a template directory and rewriting its configuration file.
pub struct TemplateProvisioner {
    template_dir: PathBuf,
}

impl TemplateProvisioner {
    pub fn new(template_dir: impl Into<PathBuf>) -> Self {
        Self {
            template_dir: template_dir.into(),
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    /// Copies the template into `instance_dir` and writes the account and
    /// display fields into its `config.json`, preserving whatever other
    /// configuration the template shipped.
    pub fn provision(&self, instance_dir: &Path, spec: &BotProvisionSpec) -> Result<()> {
        if !self.template_dir.is_dir() {
            bail!(
                "template directory {} not found",
                self.template_dir.display()
            );
        }
        if instance_dir.exists() {
            bail!(
                "instance directory {} already exists",
                instance_dir.display()
            );
        }

        copy_dir_recursive(&self.template_dir, instance_dir).with_context(|| {
            format!(
                "failed to copy template {} to {}",
                self.template_dir.display(),
                instance_dir.display()
            )
        })?;
        write_instance_config(instance_dir, spec)
    }
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    for entry in std::fs::read_dir(source)
        .with_context(|| format!("failed to read {}", source.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry in {}", source.display()))?;
        let target = destination.join(entry.file_name());
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

fn write_instance_config(instance_dir: &Path, spec: &BotProvisionSpec) -> Result<()> {
    let config_path = instance_dir.join(INSTANCE_CONFIG_FILE);
    let mut root = match std::fs::read_to_string(&config_path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
    {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let account = section(&mut root, "account");
    account.insert("uid".to_string(), json!(spec.account_uid));
    account.insert("password".to_string(), json!(spec.account_credential));
    let bot = section(&mut root, "bot");
    bot.insert("name".to_string(), json!(spec.name));
    bot.insert("display_name".to_string(), json!(spec.display_name));

    let payload =
        serde_json::to_string_pretty(&Value::Object(root)).context("failed to serialize config")?;
    write_text_atomic(&config_path, payload.as_str())
        .with_context(|| format!("failed to write {}", config_path.display()))
}

fn section<'a>(root: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = root.entry(key.to_string()).or_insert_with(|| json!({}));
    if !entry.is_object() {
        *entry = json!({});
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("section normalized to an object above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> BotProvisionSpec {
        BotProvisionSpec {
            account_uid: "900123".to_string(),
            account_credential: "hunter2".to_string(),
            name: "scout".to_string(),
            display_name: "Scout".to_string(),
        }
    }

    #[test]
    fn functional_provision_copies_tree_and_writes_account_config() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let template_dir = tempdir.path().join("template");
        std::fs::create_dir_all(template_dir.join("assets")).expect("template dirs");
        std::fs::write(template_dir.join("main.py"), "print('hi')\n").expect("entry point");
        std::fs::write(template_dir.join("assets/data.txt"), "payload").expect("asset");
        std::fs::write(
            template_dir.join("config.json"),
            r#"{"runtime": {"tick_ms": 50}}"#,
        )
        .expect("template config");

        let instance_dir = tempdir.path().join("instance");
        let provisioner = TemplateProvisioner::new(&template_dir);
        provisioner
            .provision(&instance_dir, &sample_spec())
            .expect("provision");

        assert!(instance_dir.join("main.py").is_file());
        assert_eq!(
            std::fs::read_to_string(instance_dir.join("assets/data.txt")).expect("asset copy"),
            "payload"
        );

        let config: Value = serde_json::from_str(
            &std::fs::read_to_string(instance_dir.join("config.json")).expect("config"),
        )
        .expect("parse config");
        assert_eq!(config["account"]["uid"], "900123");
        assert_eq!(config["account"]["password"], "hunter2");
        assert_eq!(config["bot"]["name"], "scout");
        assert_eq!(config["bot"]["display_name"], "Scout");
        assert_eq!(config["runtime"]["tick_ms"], 50);
    }

    #[test]
    fn unit_provision_without_template_config_starts_from_empty_object() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let template_dir = tempdir.path().join("template");
        std::fs::create_dir_all(&template_dir).expect("template dir");
        std::fs::write(template_dir.join("main.py"), "").expect("entry point");

        let instance_dir = tempdir.path().join("instance");
        TemplateProvisioner::new(&template_dir)
            .provision(&instance_dir, &sample_spec())
            .expect("provision");

        let config: Value = serde_json::from_str(
            &std::fs::read_to_string(instance_dir.join("config.json")).expect("config"),
        )
        .expect("parse config");
        assert_eq!(config["account"]["uid"], "900123");
    }

    #[test]
    fn regression_provision_refuses_existing_instance_directory() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let template_dir = tempdir.path().join("template");
        std::fs::create_dir_all(&template_dir).expect("template dir");
        let instance_dir = tempdir.path().join("instance");
        std::fs::create_dir_all(&instance_dir).expect("pre-existing instance");

        let error = TemplateProvisioner::new(&template_dir)
            .provision(&instance_dir, &sample_spec())
            .expect_err("must refuse");
        assert!(error.to_string().contains("already exists"));
    }

    #[test]
    fn regression_provision_reports_missing_template_directory() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = TemplateProvisioner::new(tempdir.path().join("absent"))
            .provision(&tempdir.path().join("instance"), &sample_spec())
            .expect_err("must refuse");
        assert!(error.to_string().contains("not found"));
    }
}
