use crate::error::AssistError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

/// The top-level workbench section currently on screen.
///
/// Views are owned by the host. Known sections get their own variant so the
/// mode table can match on them; anything else is carried verbatim in
/// `Other` and resolves to the general mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum View {
    #[default]
    Overview,
    Foundation,
    Research,
    Personas,
    Features,
    ValuePath,
    BusinessDrivers,
    Stakeholders,
    Review,
    ClientPortal,
    Other(String),
}

impl View {
    pub fn known() -> &'static [View] {
        &[
            View::Overview,
            View::Foundation,
            View::Research,
            View::Personas,
            View::Features,
            View::ValuePath,
            View::BusinessDrivers,
            View::Stakeholders,
            View::Review,
            View::ClientPortal,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            View::Overview => "overview",
            View::Foundation => "foundation",
            View::Research => "research",
            View::Personas => "personas",
            View::Features => "features",
            View::ValuePath => "value-path",
            View::BusinessDrivers => "business-drivers",
            View::Stakeholders => "stakeholders",
            View::Review => "review",
            View::ClientPortal => "client-portal",
            View::Other(s) => s,
        }
    }

    /// Parse a host view identifier. Never fails: unknown ids become `Other`.
    pub fn parse(s: &str) -> View {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        match norm.as_str() {
            "overview" => View::Overview,
            "foundation" => View::Foundation,
            "research" => View::Research,
            "personas" => View::Personas,
            "features" => View::Features,
            "value-path" => View::ValuePath,
            "business-drivers" | "drivers" => View::BusinessDrivers,
            "stakeholders" => View::Stakeholders,
            "review" => View::Review,
            "client-portal" | "portal" => View::ClientPortal,
            _ => View::Other(s.trim().to_string()),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for View {
    fn from(s: String) -> Self {
        View::parse(&s)
    }
}

impl From<View> for String {
    fn from(v: View) -> Self {
        v.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    General,
    Overview,
    Foundation,
    Personas,
    Features,
    Strategy,
    Stakeholders,
    Review,
    Portal,
}

impl Mode {
    pub fn all() -> &'static [Mode] {
        &[
            Mode::General,
            Mode::Overview,
            Mode::Foundation,
            Mode::Personas,
            Mode::Features,
            Mode::Strategy,
            Mode::Stakeholders,
            Mode::Review,
            Mode::Portal,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Overview => "overview",
            Mode::Foundation => "foundation",
            Mode::Personas => "personas",
            Mode::Features => "features",
            Mode::Strategy => "strategy",
            Mode::Stakeholders => "stakeholders",
            Mode::Review => "review",
            Mode::Portal => "portal",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| AssistError::InvalidMode(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Sort key: lower ranks are shown first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(AssistError::InvalidPriority(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Persona,
    Feature,
    BusinessDriver,
    Stakeholder,
    Document,
}

impl EntityType {
    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Persona,
            EntityType::Feature,
            EntityType::BusinessDriver,
            EntityType::Stakeholder,
            EntityType::Document,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Persona => "persona",
            EntityType::Feature => "feature",
            EntityType::BusinessDriver => "business_driver",
            EntityType::Stakeholder => "stakeholder",
            EntityType::Document => "document",
        }
    }

    /// Backend collection holding entities of this type.
    pub fn collection(self) -> &'static str {
        match self {
            EntityType::Persona => "personas",
            EntityType::Feature => "features",
            EntityType::BusinessDriver => "business_drivers",
            EntityType::Stakeholder => "stakeholders",
            EntityType::Document => "documents",
        }
    }

    /// The view where entities of this type are edited.
    pub fn home_view(self) -> View {
        match self {
            EntityType::Persona => View::Personas,
            EntityType::Feature => View::Features,
            EntityType::BusinessDriver => View::BusinessDrivers,
            EntityType::Stakeholder => View::Stakeholders,
            EntityType::Document => View::Research,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = AssistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == norm || t.collection() == norm)
            .ok_or_else(|| AssistError::InvalidEntityType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ActionVariant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVariant {
    #[default]
    Default,
    Primary,
    Warning,
    Danger,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_parse_normalizes_known_ids() {
        assert_eq!(View::parse("Business_Drivers"), View::BusinessDrivers);
        assert_eq!(View::parse("portal"), View::ClientPortal);
        assert_eq!(View::parse("settings"), View::Other("settings".into()));
        for v in View::known() {
            assert_eq!(&View::parse(v.as_str()), v);
        }
    }

    #[test]
    fn view_serializes_as_plain_string() {
        let json = serde_json::to_string(&View::ValuePath).unwrap();
        assert_eq!(json, "\"value-path\"");
        let back: View = serde_json::from_str("\"custom-tab\"").unwrap();
        assert_eq!(back, View::Other("custom-tab".into()));
    }

    #[test]
    fn priority_rank_puts_high_first() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
        assert_eq!("medium".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn entity_type_accepts_singular_and_collection_names() {
        assert_eq!("persona".parse::<EntityType>().unwrap(), EntityType::Persona);
        assert_eq!(
            "business-drivers".parse::<EntityType>().unwrap(),
            EntityType::BusinessDriver
        );
        assert!("widget".parse::<EntityType>().is_err());
    }
}
