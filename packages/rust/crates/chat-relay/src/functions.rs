//! Link function registry: function name → description → static reply.
//!
//! The model only ever sees names and descriptions; when it signals a call,
//! the relay substitutes the entry's reply for the model's own content.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{RelayError, Result};

/// Reply used when the model asks for a function outside the registry.
pub const UNRECOGNIZED_FUNCTION_REPLY: &str = "Sorry, I couldn't recognize that function.";

/// Persona sentence used when settings do not provide one.
pub const DEFAULT_PERSONA: &str = "You are Bharath's helpful assistant, capable of sharing links.";

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFunction {
    pub name: String,
    pub description: String,
    /// Static text or HTML returned verbatim as the reply.
    pub reply: String,
}

impl LinkFunction {
    fn new(name: &str, description: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            reply: reply.to_string(),
        }
    }
}

/// Outcome of resolving a model-signaled function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(String),
    Unrecognized(String),
}

impl Resolution {
    pub fn into_reply(self) -> String {
        match self {
            Self::Matched(reply) | Self::Unrecognized(reply) => reply,
        }
    }
}

/// Ordered, immutable function table injected into the relay at startup.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    entries: Vec<LinkFunction>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::default_links()
    }
}

impl FunctionRegistry {
    /// Build a registry; names must be non-empty and unique.
    pub fn new(entries: Vec<LinkFunction>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(RelayError::Config(
                    "function name must be non-empty".to_string(),
                ));
            }
            if !seen.insert(name.to_string()) {
                return Err(RelayError::Config(format!(
                    "duplicate function name `{name}`"
                )));
            }
        }
        Ok(Self { entries })
    }

    /// The five built-in contact links.
    pub fn default_links() -> Self {
        Self {
            entries: vec![
                LinkFunction::new(
                    "book_call",
                    "Provides a link to book a call with Bharath.",
                    r#"👉 <a href="https://cal.com/bharaths-design" target="_blank" rel="noopener noreferrer">Book a call with Bharath</a>"#,
                ),
                LinkFunction::new(
                    "get_portfolio",
                    "Provides Bharath's portfolio link.",
                    r#"🌐 <a href="https://www.designwithbharath.com/" target="_blank" rel="noopener noreferrer">View Bharath's portfolio</a>"#,
                ),
                LinkFunction::new(
                    "get_email",
                    "Provides Bharath's email address link.",
                    r#"📧 <a href="mailto:Designwithbharath@gmail.com">Contact Bharath via email</a>"#,
                ),
                LinkFunction::new(
                    "get_linkedin",
                    "Provides Bharath's LinkedIn profile link.",
                    r#"💼 <a href="https://www.linkedin.com/in/bharath-kumar79/" target="_blank" rel="noopener noreferrer">Connect with Bharath on LinkedIn</a>"#,
                ),
                LinkFunction::new(
                    "get_resume",
                    "Provides Bharath's resume link.",
                    r#"📄 <a href="https://drive.google.com/file/d/1ttmiu9g53oUoXNPDDOAKd7GTkOr0g13c/view" target="_blank" rel="noopener noreferrer">Download Bharath's resume</a>"#,
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&LinkFunction> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Map a function name to its reply. Unknown names degrade to a fixed fallback.
    pub fn resolve(&self, name: &str) -> Resolution {
        match self.get(name.trim()) {
            Some(entry) => {
                tracing::debug!(
                    event = "relay.function.resolved",
                    function = entry.name.as_str(),
                    "resolved function call"
                );
                Resolution::Matched(entry.reply.clone())
            }
            None => {
                tracing::warn!(
                    event = "relay.function.unrecognized",
                    function = name,
                    "model requested a function outside the registry"
                );
                Resolution::Unrecognized(UNRECOGNIZED_FUNCTION_REPLY.to_string())
            }
        }
    }

    /// Upstream function descriptors (name, description, empty object schema).
    pub fn descriptors(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|e| {
                json!({
                    "name": e.name,
                    "description": e.description,
                    "parameters": { "type": "object", "properties": {}, "required": [] },
                })
            })
            .collect()
    }

    /// System instruction injected ahead of conversations that carry none.
    pub fn system_directive(&self, persona: &str) -> String {
        let persona = persona.trim();
        if self.entries.is_empty() {
            return persona.to_string();
        }
        let listed = self
            .entries
            .iter()
            .map(|e| format!("- {}: {}", e.name, e.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{persona}\n\nYou can call these functions:\n{listed}\n\n\
             When the user asks for one of these links, call the matching function \
             instead of describing the link or writing it out yourself."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_five_unique_links() {
        let registry = FunctionRegistry::default_links();
        assert_eq!(
            registry.names(),
            vec![
                "book_call",
                "get_portfolio",
                "get_email",
                "get_linkedin",
                "get_resume"
            ]
        );
        assert!(FunctionRegistry::new(registry.entries.clone()).is_ok());
    }

    #[test]
    fn resolve_email_yields_static_link() {
        let registry = FunctionRegistry::default_links();
        assert_eq!(
            registry.resolve("get_email"),
            Resolution::Matched(
                r#"📧 <a href="mailto:Designwithbharath@gmail.com">Contact Bharath via email</a>"#
                    .to_string()
            )
        );
    }

    #[test]
    fn resolve_unknown_degrades_to_fallback() {
        let registry = FunctionRegistry::default_links();
        assert_eq!(
            registry.resolve("get_twitter").into_reply(),
            UNRECOGNIZED_FUNCTION_REPLY
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let entry = LinkFunction::new("a", "A", "x");
        let err = FunctionRegistry::new(vec![entry.clone(), entry]).expect_err("duplicate");
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn directive_enumerates_every_function() {
        let registry = FunctionRegistry::default_links();
        let directive = registry.system_directive(DEFAULT_PERSONA);
        assert!(directive.starts_with(DEFAULT_PERSONA));
        for name in registry.names() {
            assert!(directive.contains(name), "missing {name}");
        }
        assert!(directive.contains("call the matching function"));
    }

    #[test]
    fn descriptors_use_empty_object_schema() {
        let registry = FunctionRegistry::default_links();
        let first = &registry.descriptors()[0];
        assert_eq!(first["name"], "book_call");
        assert_eq!(first["parameters"]["properties"], json!({}));
    }
}
