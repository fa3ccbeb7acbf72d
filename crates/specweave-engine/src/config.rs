//! Weaver configuration
//!
//! Every naming convention the engine relies on lives here so hosts with a
//! different contract runtime can retarget the weaver without code changes.
//! Missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};
use specweave_bytecode::{MethodDescriptor, ReturnType, ValueType, ROOT_CLASS};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read weaver config: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse weaver config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Semantically invalid setting
    #[error("Invalid weaver config: {0}")]
    ValidationError(String),
}

/// Naming conventions and switches used by the weaver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// Class annotation that opts a class into weaving
    pub marker: String,

    /// Annotation added to every class the weaver changed
    pub woven_marker: String,

    /// Suffix appended to a class name to find its companion
    pub spec_suffix: String,

    /// Suffix appended to a method name to find its specification function
    pub method_spec_suffix: String,

    /// Name of the constructor specification function
    pub constructor_spec: String,

    /// Suffix appended to a method name to name its wrapper
    pub wrapper_suffix: String,

    /// Root of every class hierarchy; resolution stops here
    pub root_class: String,

    /// Interface of deferred checks taking the result
    pub deferred_check: String,

    /// Method invoked on a deferred check
    pub deferred_check_method: String,

    /// Interface of deferred checks taking no argument
    pub deferred_runnable: String,

    /// Method invoked on a deferred runnable
    pub deferred_runnable_method: String,

    /// Class-name suffixes that are never transformed
    pub skip_suffixes: Vec<String>,

    /// Treat a marked class without a companion as an error
    pub strict_companions: bool,

    /// Re-verify frame sizes of every class the weaver changed
    pub verify_output: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            marker: "contracts/Contracted".to_string(),
            woven_marker: "contracts/Woven".to_string(),
            spec_suffix: "Spec".to_string(),
            method_spec_suffix: "Spec".to_string(),
            constructor_spec: "constructorSpec".to_string(),
            wrapper_suffix: "$contract".to_string(),
            root_class: ROOT_CLASS.to_string(),
            deferred_check: "contracts/DeferredCheck".to_string(),
            deferred_check_method: "check".to_string(),
            deferred_runnable: "contracts/DeferredRunnable".to_string(),
            deferred_runnable_method: "run".to_string(),
            skip_suffixes: vec!["package-info".to_string()],
            strict_companions: false,
            verify_output: true,
        }
    }
}

impl WeaverConfig {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: WeaverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("marker", &self.marker),
            ("woven_marker", &self.woven_marker),
            ("spec_suffix", &self.spec_suffix),
            ("constructor_spec", &self.constructor_spec),
            ("wrapper_suffix", &self.wrapper_suffix),
            ("root_class", &self.root_class),
            ("deferred_check", &self.deferred_check),
            ("deferred_runnable", &self.deferred_runnable),
        ];
        for (key, value) in required {
            if value.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "'{}' cannot be empty",
                    key
                )));
            }
        }
        if self.marker == self.woven_marker {
            return Err(ConfigError::ValidationError(
                "'marker' and 'woven_marker' must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Companion specification class of `class`
    pub fn companion_name(&self, class: &str) -> String {
        format!("{}{}", class, self.spec_suffix)
    }

    /// Specification function name for method `name`
    pub fn spec_method_name(&self, name: &str) -> String {
        format!("{}{}", name, self.method_spec_suffix)
    }

    /// Wrapper function name for method `name`
    pub fn wrapper_name(&self, name: &str) -> String {
        format!("{}{}", name, self.wrapper_suffix)
    }

    /// Method name whose specification function is `spec_name`, if it is one
    pub fn method_for_spec<'a>(&self, spec_name: &'a str) -> Option<&'a str> {
        if spec_name == self.constructor_spec {
            return None;
        }
        spec_name
            .strip_suffix(self.method_spec_suffix.as_str())
            .filter(|name| !name.is_empty())
    }

    /// True if classes with this name are never transformed
    pub fn is_skipped(&self, class: &str) -> bool {
        self.skip_suffixes.iter().any(|suffix| class.ends_with(suffix.as_str()))
    }

    /// Descriptor of the deferred check invocation: `(L<root>;)V`
    pub fn check_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(
            vec![ValueType::object(self.root_class.as_str())],
            ReturnType::Void,
        )
    }

    /// Descriptor of the deferred runnable invocation: `()V`
    pub fn run_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(Vec::new(), ReturnType::Void)
    }

    /// Deferred value type produced by the specification of a method
    /// returning `ret`
    pub fn deferred_type(&self, ret: &ReturnType) -> ValueType {
        match ret {
            ReturnType::Void => ValueType::object(self.deferred_runnable.as_str()),
            ReturnType::Value(_) => ValueType::object(self.deferred_check.as_str()),
        }
    }

    /// Specification function descriptor for instance method `method` of `owner`
    ///
    /// `(L<owner>;P1..Pn)L<DeferredCheck>;`, or the runnable type for void methods.
    pub fn method_spec_descriptor(&self, owner: &str, method: &MethodDescriptor) -> MethodDescriptor {
        method
            .with_leading_param(ValueType::object(owner))
            .with_return(ReturnType::Value(self.deferred_type(&method.ret)))
    }

    /// Specification function descriptor for a constructor: `(P1..Pn)L<DeferredCheck>;`
    pub fn constructor_spec_descriptor(&self, constructor: &MethodDescriptor) -> MethodDescriptor {
        constructor.with_return(ReturnType::Value(ValueType::object(
            self.deferred_check.as_str(),
        )))
    }

    /// Wrapper descriptor for method `method` owned by `owner`: `(L<owner>;P1..Pn)R`
    pub fn wrapper_descriptor(&self, owner: &str, method: &MethodDescriptor) -> MethodDescriptor {
        method.with_leading_param(ValueType::object(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WeaverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.companion_name("bank/Account"), "bank/AccountSpec");
        assert_eq!(config.spec_method_name("withdraw"), "withdrawSpec");
        assert_eq!(config.wrapper_name("withdraw"), "withdraw$contract");
        assert!(config.is_skipped("bank/package-info"));
        assert!(!config.is_skipped("bank/Account"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = WeaverConfig::from_toml_str(
            r#"
            marker = "acme/Checked"
            strict_companions = true
            "#,
        )
        .unwrap();
        assert_eq!(config.marker, "acme/Checked");
        assert!(config.strict_companions);
        assert_eq!(config.spec_suffix, "Spec");
        assert!(config.verify_output);
    }

    #[test]
    fn test_invalid_config() {
        let err = WeaverConfig::from_toml_str("wrapper_suffix = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = WeaverConfig::from_toml_str("marker = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_spec_descriptors() {
        let config = WeaverConfig::default();
        let withdraw = MethodDescriptor::parse("(I)Z").unwrap();
        assert_eq!(
            config.method_spec_descriptor("Account", &withdraw).to_string(),
            "(LAccount;I)Lcontracts/DeferredCheck;"
        );

        let deposit = MethodDescriptor::parse("(I)V").unwrap();
        assert_eq!(
            config.method_spec_descriptor("Account", &deposit).to_string(),
            "(LAccount;I)Lcontracts/DeferredRunnable;"
        );

        let ctor = MethodDescriptor::parse("(I)V").unwrap();
        assert_eq!(
            config.constructor_spec_descriptor(&ctor).to_string(),
            "(I)Lcontracts/DeferredCheck;"
        );
        assert_eq!(
            config.wrapper_descriptor("Account", &withdraw).to_string(),
            "(LAccount;I)Z"
        );
    }

    #[test]
    fn test_method_for_spec() {
        let config = WeaverConfig::default();
        assert_eq!(config.method_for_spec("withdrawSpec"), Some("withdraw"));
        assert_eq!(config.method_for_spec("Spec"), None);
        assert_eq!(config.method_for_spec("helper"), None);
        assert_eq!(config.method_for_spec("constructorSpec"), None);
    }
}
