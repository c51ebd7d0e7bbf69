//! Configuration for object graph serialization.
//!
//! [`SerializationConfiguration`] is passed through every operation and never
//! mutated by the engine. It can be built in code or loaded from JSON.
//!
//! ## Examples
//!
//! ```rust
//! use serde_graph::SerializationConfiguration;
//!
//! let config = SerializationConfiguration::new()
//!     .with_pretty(true)
//!     .with_indent(4)
//!     .with_graph_ids(false);
//! assert!(!config.auto_generate_graph_ids);
//!
//! let loaded = SerializationConfiguration::from_json_str(r#"{ "culture": "nl-NL" }"#).unwrap();
//! assert_eq!(loaded.culture, "nl-NL");
//! assert!(loaded.auto_generate_graph_ids);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Culture used when none is configured.
pub const INVARIANT_CULTURE: &str = "invariant";

/// Settings shared by all formats.
///
/// - `culture`: carried through to modifiers, the engine itself always writes
///   culture-invariant text
/// - `auto_generate_graph_ids`: track instance identity and emit reference
///   markers for repeated instances
/// - `pretty` / `indent`: layout of the text formats
/// - `xml_declaration`: emit `<?xml ...?>` in front of XML documents
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfiguration {
    pub culture: String,
    pub auto_generate_graph_ids: bool,
    pub pretty: bool,
    pub indent: usize,
    pub xml_declaration: bool,
}

impl Default for SerializationConfiguration {
    fn default() -> Self {
        SerializationConfiguration {
            culture: INVARIANT_CULTURE.to_string(),
            auto_generate_graph_ids: true,
            pretty: false,
            indent: 2,
            xml_declaration: true,
        }
    }
}

impl SerializationConfiguration {
    /// Creates the default configuration (compact output, graph ids on).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde_graph::SerializationConfiguration;
    ///
    /// let config = SerializationConfiguration::new();
    /// assert_eq!(config.indent, 2);
    /// assert!(!config.pretty);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for indented output.
    #[must_use]
    pub fn pretty() -> Self {
        SerializationConfiguration {
            pretty: true,
            ..Default::default()
        }
    }

    /// Loads a configuration from JSON. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or a key has the wrong type.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: SerializationConfiguration = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty culture or an indent above 16.
    pub fn validate(&self) -> Result<()> {
        if self.culture.trim().is_empty() {
            return Err(Error::invalid_argument("culture must not be empty"));
        }
        if self.indent > 16 {
            return Err(Error::invalid_argument(format!(
                "indent of {} exceeds the maximum of 16",
                self.indent
            )));
        }
        Ok(())
    }

    /// Sets the culture name handed to modifiers.
    #[must_use]
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    /// Enables or disables graph id generation.
    ///
    /// Without graph ids, repeated instances are written in full and cycles are an error.
    #[must_use]
    pub fn with_graph_ids(mut self, enabled: bool) -> Self {
        self.auto_generate_graph_ids = enabled;
        self
    }

    /// Enables or disables indented output.
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Sets the indentation size (number of spaces per level).
    ///
    /// Only affects pretty-printed output.
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Enables or disables the XML declaration.
    #[must_use]
    pub fn with_xml_declaration(mut self, declaration: bool) -> Self {
        self.xml_declaration = declaration;
        self
    }
}
