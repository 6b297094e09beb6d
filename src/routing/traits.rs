//! Routing traits and types for choosing which persona answers a query.

use anyhow::{bail, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Persona chosen when no keyword matches. Every persona set must declare it.
pub const DEFAULT_PERSONA: &str = "General Assistant";

/// A named configuration that decides how the model behaves for a turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Persona {
    /// Display name, also the pin key (e.g. `"Travel Agent"`).
    pub name: String,
    /// One-line description shown in persona listings.
    #[serde(default)]
    pub description: String,
    /// System prompt sent to the model for every turn this persona handles.
    pub system_prompt: String,
    /// Display icon.
    #[serde(default)]
    pub icon: String,
    /// Display color as a hex string (e.g. `"#FF6B6B"`).
    #[serde(default)]
    pub color: String,
    /// Substrings that vote for this persona. Matched case-insensitively.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Persona {
    /// Count how many of this persona's keywords occur in an already
    /// lower-cased query.
    pub fn match_count(&self, lowered_query: &str) -> usize {
        self.keywords
            .iter()
            .filter(|keyword| lowered_query.contains(keyword.as_str()))
            .count()
    }
}

/// An ordered, validated set of personas. Declaration order is the
/// tie-break order.
#[derive(Debug, Clone)]
pub struct PersonaSet {
    personas: Vec<Persona>,
    default_index: usize,
}

impl PersonaSet {
    /// Build a set, lower-casing and de-duplicating keywords.
    ///
    /// Fails on an empty set, duplicate names, or a missing [`DEFAULT_PERSONA`].
    pub fn new(personas: Vec<Persona>) -> Result<Self> {
        if personas.is_empty() {
            bail!("persona set must not be empty");
        }

        let mut normalized: Vec<Persona> = Vec::with_capacity(personas.len());
        for mut persona in personas {
            if persona.name.trim().is_empty() {
                bail!("persona name must not be empty");
            }
            if normalized.iter().any(|p| p.name == persona.name) {
                bail!("duplicate persona name: {}", persona.name);
            }

            let mut keywords: Vec<String> = Vec::with_capacity(persona.keywords.len());
            for keyword in persona.keywords.drain(..) {
                let keyword = keyword.trim().to_lowercase();
                if !keyword.is_empty() && !keywords.contains(&keyword) {
                    keywords.push(keyword);
                }
            }
            persona.keywords = keywords;
            normalized.push(persona);
        }

        let Some(default_index) = normalized.iter().position(|p| p.name == DEFAULT_PERSONA) else {
            bail!("persona set must include the default persona \"{DEFAULT_PERSONA}\"");
        };

        Ok(Self {
            personas: normalized,
            default_index,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn default_persona(&self) -> &Persona {
        &self.personas[self.default_index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

/// How a persona was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchedBy {
    /// The session pinned this persona.
    Pinned,
    /// Highest keyword count.
    Keywords { count: usize },
    /// No keyword matched anywhere.
    Default,
}

/// The result of routing a query.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'a> {
    pub persona: &'a Persona,
    pub matched_by: MatchedBy,
}

/// Picks the persona that answers a query.
pub trait Router: Send + Sync {
    /// Select a persona for `query`. A pinned persona that exists in
    /// `personas` always wins.
    fn select<'a>(
        &self,
        query: &str,
        pinned: Option<&str>,
        personas: &'a PersonaSet,
    ) -> RouteMatch<'a>;

    /// The name of this router implementation.
    fn name(&self) -> &str;
}
