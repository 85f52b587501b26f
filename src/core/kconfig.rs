//! Kconfig-style configuration files
//!
//! Linux and BusyBox both keep their configuration as `CONFIG_*` lines in a
//! `.config` file. [`ConfigTemplate`] edits such files in place and expands
//! the `@NAME@` placeholders of target-provided config files.
//!
//! Placeholders understood by [`ConfigTemplate::substitute`]:
//!
//! - `@ARCH@` - kernel architecture (`riscv`)
//! - `@MARCH@` - `-march` value (`rv64gc`)
//! - `@MABI@` - `-mabi` value (`lp64`)
//! - `@CROSS_COMPILE@` - cross tool prefix (`riscv64-unknown-linux-gnu-`)
//! - `@XLEN@` - register width (`64`)
//! - `@PREFIX@` - install directory of the component

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex};

use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Placeholder names accepted in config templates
pub const PLACEHOLDERS: [&str; 6] = ["ARCH", "MARCH", "MABI", "CROSS_COMPILE", "XLEN", "PREFIX"];

/// An editable Kconfig file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTemplate {
    content: String,
}

impl ConfigTemplate {
    /// Wrap config text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Read a config file
    pub fn load(path: &Path) -> Result<Self, FilesystemError> {
        filesystem::read_file(path).map(Self::new)
    }

    /// Write the config to `path`
    pub fn write(&self, path: &Path) -> Result<(), FilesystemError> {
        filesystem::write_file(path, &self.content)
    }

    /// Current text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replace every `@NAME@` placeholder with its value
    ///
    /// Unknown placeholders are left as they are.
    pub fn substitute(&mut self, vars: &BTreeMap<&str, String>) {
        for (name, value) in vars {
            self.content = self.content.replace(&format!("@{name}@"), value);
        }
    }

    /// Set `CONFIG_<name>=<value>`, replacing any existing or disabled entry
    pub fn set_symbol(&mut self, name: &str, value: &str) {
        let line = format!("CONFIG_{name}={value}");
        let re = symbol_regex(name);

        if re.is_match(&self.content) {
            self.content = re.replace_all(&self.content, NoExpand(&line)).into_owned();
        } else {
            if !self.content.is_empty() && !self.content.ends_with('\n') {
                self.content.push('\n');
            }
            self.content.push_str(&line);
            self.content.push('\n');
        }
    }

    /// Set a string symbol, quoting the value
    pub fn set_string(&mut self, name: &str, value: &str) {
        self.set_symbol(name, &format!("\"{}\"", value.replace('"', "\\\"")));
    }

    /// Mark a symbol as `is not set`
    pub fn disable(&mut self, name: &str) {
        let line = format!("# CONFIG_{name} is not set");
        let re = symbol_regex(name);

        if re.is_match(&self.content) {
            self.content = re.replace_all(&self.content, NoExpand(&line)).into_owned();
        } else {
            if !self.content.is_empty() && !self.content.ends_with('\n') {
                self.content.push('\n');
            }
            self.content.push_str(&line);
            self.content.push('\n');
        }
    }

    /// Value of an enabled symbol, quotes included
    pub fn get(&self, name: &str) -> Option<&str> {
        let prefix = format!("CONFIG_{name}=");
        self.content
            .lines()
            .find_map(|line| line.strip_prefix(&prefix))
    }

    /// Whether a symbol is set to `y`
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name) == Some("y")
    }
}

/// Matches both `CONFIG_X=...` and `# CONFIG_X is not set` for one symbol
fn symbol_regex(name: &str) -> Regex {
    let name = regex::escape(name);
    Regex::new(&format!(
        r"(?m)^(?:CONFIG_{name}=.*|# CONFIG_{name} is not set)$"
    ))
    .expect("Invalid symbol regex")
}

/// Target-provided config file for a component, if one exists
pub fn target_config(config_dir: &Path, component: &str) -> Option<PathBuf> {
    let path = config_dir.join(format!("{component}.config"));
    path.is_file().then_some(path)
}
