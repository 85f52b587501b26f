//! Test utilities
//!
//! A recording [`ProcessRunner`] for unit tests and proptest generators.

use std::path::Path;

use crate::infra::process::{ExternalCommand, ProcessError, ProcessRunner};

type Predicate = Box<dyn Fn(&ExternalCommand) -> bool>;
type Effect = Box<dyn FnMut(&ExternalCommand)>;

/// Runner that records commands instead of executing them
pub struct RecordingRunner {
    commands: Vec<ExternalCommand>,
    fail: Option<Predicate>,
    effects: Vec<Effect>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            fail: None,
            effects: Vec::new(),
        }
    }

    /// Fail every command matching `predicate`
    #[must_use]
    pub fn fail_when(mut self, predicate: impl Fn(&ExternalCommand) -> bool + 'static) -> Self {
        self.fail = Some(Box::new(predicate));
        self
    }

    /// Run `effect` after every successful command, to simulate its outputs
    #[must_use]
    pub fn on_success(mut self, effect: impl FnMut(&ExternalCommand) + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn commands(&self) -> &[ExternalCommand] {
        &self.commands
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&mut self, command: &ExternalCommand, _log: &Path) -> Result<(), ProcessError> {
        self.commands.push(command.clone());
        if self.fail.as_ref().is_some_and(|f| f(command)) {
            return Err(ProcessError::Failed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        for effect in &mut self.effects {
            effect(command);
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a Kconfig symbol name without the `CONFIG_` prefix
    pub fn kconfig_symbol() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9_]{0,30}"
    }

    /// Generate a patch file stem such as `0003-fix-build`
    pub fn patch_stem() -> impl Strategy<Value = String> {
        (0u32..100, "[a-z]{1,10}").prop_map(|(n, name)| format!("{n:04}-{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_kconfig_symbol_generator(sym in kconfig_symbol()) {
            prop_assert!(!sym.is_empty());
            prop_assert!(sym.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
        }

        #[test]
        fn test_patch_stem_generator(stem in patch_stem()) {
            prop_assert!(stem.len() >= 6);
            prop_assert!(stem[..4].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
